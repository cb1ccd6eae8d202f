//! In-memory database for integration tests.
//!
//! Understands the SQL the sqlrelate builders emit for the Postgres dialect:
//! INSERT, SELECT with an optional INNER JOIN and a WHERE clause made of
//! `=`/`IN` comparisons joined by AND/OR, UPDATE and DELETE. Every statement
//! is logged so tests can count round trips.

#![allow(dead_code)]

use asupersync::{Cx, Outcome};
use regex::Regex;
use sqlrelate::{Error, Model, QueryError, QueryErrorKind, Result, Row, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        Outcome::Ok(_) => panic!("expected an error, got Ok"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }
}

impl Model for User {
    const TABLE_NAME: &'static str = "users";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn is_new(&self) -> bool {
        self.id.is_none()
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    /// Set by tests to simulate an unsaved edit; never stored.
    pub edited: bool,
}

impl Post {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
            edited: false,
        }
    }
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("id", self.id.into()), ("title", self.title.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            title: row.get_named("title")?,
            edited: false,
        })
    }

    fn primary_key_value(&self) -> Vec<Value> {
        vec![self.id.into()]
    }

    fn is_new(&self) -> bool {
        self.id.is_none()
    }

    fn is_dirty(&self) -> bool {
        self.edited
    }

    fn mark_clean(&mut self) {
        self.edited = false;
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

// ============================================================================
// Fake database
// ============================================================================

type Record = Vec<(String, Value)>;

#[derive(Debug, Default)]
struct DbState {
    tables: BTreeMap<String, Vec<Record>>,
    unique: Vec<(String, Vec<String>)>,
    fail_on: Vec<String>,
    log: Vec<(String, Vec<Value>)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDb {
    state: Arc<Mutex<DbState>>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows directly, bypassing the log.
    pub fn seed(&self, table: &str, rows: Vec<Vec<(&str, Value)>>) {
        let mut state = self.state.lock().expect("lock poisoned");
        let records = state.tables.entry(table.to_string()).or_default();
        for row in rows {
            records.push(
                row.into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
            );
        }
    }

    /// Reject inserts that repeat `columns` of an existing row.
    pub fn unique(&self, table: &str, columns: &[&str]) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.unique.push((
            table.to_string(),
            columns.iter().map(|c| (*c).to_string()).collect(),
        ));
    }

    /// Fail every statement containing `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.fail_on.push(fragment.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .tables
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .map(|r| Row::from_pairs(r.iter().cloned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().expect("lock poisoned");
        state.tables.get(table).map_or(0, Vec::len)
    }

    /// `(column_a, column_b)` of every row, as i64.
    pub fn pairs(&self, table: &str, a: &str, b: &str) -> Vec<(i64, i64)> {
        self.rows(table)
            .iter()
            .map(|row| {
                (
                    row.get_named::<i64>(a).expect("column a"),
                    row.get_named::<i64>(b).expect("column b"),
                )
            })
            .collect()
    }

    pub fn statements(&self) -> Vec<String> {
        let state = self.state.lock().expect("lock poisoned");
        state.log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn count_statements(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.starts_with(prefix))
            .count()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.log.clear();
    }

    fn run(&self, sql: &str, params: &[Value], returning_id: bool) -> Outcome<Answer, Error> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.log.push((sql.to_string(), params.to_vec()));
        if state.fail_on.iter().any(|f| sql.contains(f.as_str())) {
            return Outcome::Err(query_error(QueryErrorKind::Database, sql, "injected failure"));
        }
        match state.apply(sql, params, returning_id) {
            Ok(answer) => Outcome::Ok(answer),
            Err(e) => Outcome::Err(e),
        }
    }
}

enum Answer {
    Rows(Vec<Row>),
    Affected(u64),
    Inserted(i64),
}

fn query_error(kind: QueryErrorKind, sql: &str, message: &str) -> Error {
    Error::Query(QueryError {
        kind,
        sql: Some(sql.to_string()),
        sqlstate: (kind == QueryErrorKind::Constraint).then(|| "23505".to_string()),
        message: message.to_string(),
        source: None,
    })
}

static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^INSERT INTO "(\w+)" (?:\((.*)\) VALUES \((.*)\)|DEFAULT VALUES)$"#)
        .expect("insert pattern")
});
static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^SELECT (DISTINCT )?(.+?) FROM "(\w+)"(?: INNER JOIN "(\w+)" ON (.+?))?(?: WHERE (.+?))?(?: LIMIT (\d+))?$"#,
    )
    .expect("select pattern")
});
static UPDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^UPDATE "(\w+)" SET (.+?)(?: WHERE (.+))?$"#).expect("update pattern")
});
static DELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^DELETE FROM "(\w+)"(?: WHERE (.+))?$"#).expect("delete pattern")
});
static COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:"(\w+)"\.)?"(\w+)"$"#).expect("column pattern")
});
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$(\d+)$").expect("placeholder pattern"));
static ALIASED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(.+) AS "(\w+)"$"#).expect("alias pattern"));
static IN_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) IN \((.*)\)$").expect("in pattern"));
static COMPARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+) (=|<>) (\S+)$").expect("compare pattern"));

/// A row under evaluation: `(table, column, value)` triples.
type Scope = Vec<(String, String, Value)>;

fn scope_of(table: &str, record: &Record) -> Scope {
    record
        .iter()
        .map(|(name, value)| (table.to_string(), name.clone(), value.clone()))
        .collect()
}

impl DbState {
    fn apply(&mut self, sql: &str, params: &[Value], returning_id: bool) -> Result<Answer> {
        if let Some(caps) = INSERT.captures(sql) {
            let table = caps[1].to_string();
            let mut record: Record = Vec::new();
            if let (Some(columns), Some(values)) = (caps.get(2), caps.get(3)) {
                for (column, value) in split_top(columns.as_str(), ", ")
                    .into_iter()
                    .zip(split_top(values.as_str(), ", "))
                {
                    record.push((unquote(column), resolve_param(value, params, sql)?));
                }
            }
            return self.insert(&table, record, returning_id, sql);
        }

        if let Some(caps) = SELECT.captures(sql) {
            return self.select(&caps, params, sql).map(Answer::Rows);
        }

        if let Some(caps) = UPDATE.captures(sql) {
            let table = caps[1].to_string();
            let mut assignments = Vec::new();
            for assignment in split_top(&caps[2], ", ") {
                let (column, value) = assignment.split_once(" = ").ok_or_else(|| {
                    query_error(QueryErrorKind::Syntax, sql, "bad assignment")
                })?;
                assignments.push((unquote(column), resolve_param(value, params, sql)?));
            }
            let filter = caps.get(3).map(|m| m.as_str().to_string());
            let mut affected = 0;
            for record in self.tables.entry(table.clone()).or_default().iter_mut() {
                let scope = scope_of(&table, record);
                if let Some(filter) = &filter {
                    if !eval(filter, &scope, params, sql)? {
                        continue;
                    }
                }
                for (column, value) in &assignments {
                    match record.iter_mut().find(|(name, _)| name == column) {
                        Some(slot) => slot.1 = value.clone(),
                        None => record.push((column.clone(), value.clone())),
                    }
                }
                affected += 1;
            }
            return Ok(Answer::Affected(affected));
        }

        if let Some(caps) = DELETE.captures(sql) {
            let table = caps[1].to_string();
            let filter = caps.get(2).map(|m| m.as_str().to_string());
            let records = self.tables.entry(table.clone()).or_default();
            let mut kept = Vec::with_capacity(records.len());
            let mut affected = 0;
            for record in records.drain(..) {
                let matched = match &filter {
                    Some(filter) => eval(filter, &scope_of(&table, &record), params, sql)?,
                    None => true,
                };
                if matched {
                    affected += 1;
                } else {
                    kept.push(record);
                }
            }
            *records = kept;
            return Ok(Answer::Affected(affected));
        }

        Err(query_error(QueryErrorKind::Syntax, sql, "unsupported statement"))
    }

    fn insert(
        &mut self,
        table: &str,
        mut record: Record,
        returning_id: bool,
        sql: &str,
    ) -> Result<Answer> {
        let records = self.tables.entry(table.to_string()).or_default();
        for (unique_table, columns) in &self.unique {
            if unique_table != table {
                continue;
            }
            let duplicate = records.iter().any(|existing| {
                columns.iter().all(|column| {
                    let a = existing.iter().find(|(n, _)| n == column).map(|(_, v)| v);
                    let b = record.iter().find(|(n, _)| n == column).map(|(_, v)| v);
                    matches!((a, b), (Some(a), Some(b)) if a.same_identity(b))
                })
            });
            if duplicate {
                return Err(query_error(
                    QueryErrorKind::Constraint,
                    sql,
                    "duplicate key value violates unique constraint",
                ));
            }
        }

        if !returning_id {
            records.push(record);
            return Ok(Answer::Affected(1));
        }

        let next_id = records
            .iter()
            .filter_map(|r| r.iter().find(|(n, _)| n == "id").and_then(|(_, v)| v.as_i64()))
            .max()
            .unwrap_or(0)
            + 1;
        let id = match record.iter().find(|(n, _)| n == "id").map(|(_, v)| v.clone()) {
            Some(value) if !value.is_null() => value.as_i64().unwrap_or(next_id),
            _ => {
                record.retain(|(n, _)| n != "id");
                record.insert(0, ("id".to_string(), Value::BigInt(next_id)));
                next_id
            }
        };
        records.push(record);
        Ok(Answer::Inserted(id))
    }

    fn select(&self, caps: &regex::Captures<'_>, params: &[Value], sql: &str) -> Result<Vec<Row>> {
        let projection = caps[2].to_string();
        let base = caps[3].to_string();
        let empty = Vec::new();

        let mut scopes: Vec<Scope> = Vec::new();
        for record in self.tables.get(&base).unwrap_or(&empty) {
            let scope = scope_of(&base, record);
            match (caps.get(4), caps.get(5)) {
                (Some(joined), Some(on)) => {
                    for other in self.tables.get(joined.as_str()).unwrap_or(&empty) {
                        let mut combined = scope.clone();
                        combined.extend(scope_of(joined.as_str(), other));
                        if eval(on.as_str(), &combined, params, sql)? {
                            scopes.push(combined);
                        }
                    }
                }
                _ => scopes.push(scope),
            }
        }

        if let Some(filter) = caps.get(6) {
            let mut kept = Vec::with_capacity(scopes.len());
            for scope in scopes {
                if eval(filter.as_str(), &scope, params, sql)? {
                    kept.push(scope);
                }
            }
            scopes = kept;
        }

        if projection == "COUNT(*) AS \"count\"" {
            let count = i64::try_from(scopes.len()).unwrap_or(i64::MAX);
            return Ok(vec![Row::from_pairs([("count", Value::BigInt(count))])]);
        }

        let mut rows = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let mut pairs: Vec<(String, Value)> = Vec::new();
            for item in split_top(&projection, ", ") {
                if item == "*" {
                    pairs.extend(scope.iter().map(|(_, c, v)| (c.clone(), v.clone())));
                } else if let Some(table) = item.strip_suffix(".*") {
                    let table = unquote(table);
                    pairs.extend(
                        scope
                            .iter()
                            .filter(|(t, _, _)| *t == table)
                            .map(|(_, c, v)| (c.clone(), v.clone())),
                    );
                } else if let Some(aliased) = ALIASED.captures(item) {
                    let value = lookup(&aliased[1], scope, sql)?;
                    pairs.push((aliased[2].to_string(), value));
                } else {
                    let value = lookup(item, scope, sql)?;
                    let name = COLUMN
                        .captures(item)
                        .map_or_else(|| item.to_string(), |c| c[2].to_string());
                    pairs.push((name, value));
                }
            }
            rows.push(Row::from_pairs(pairs));
        }
        if let Some(limit) = caps.get(7) {
            let limit = limit.as_str().parse::<usize>().unwrap_or(usize::MAX);
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

fn unquote(identifier: &str) -> String {
    identifier.trim().trim_matches('"').to_string()
}

fn resolve_param(token: &str, params: &[Value], sql: &str) -> Result<Value> {
    let caps = PLACEHOLDER
        .captures(token.trim())
        .ok_or_else(|| query_error(QueryErrorKind::Syntax, sql, "expected placeholder"))?;
    let index: usize = caps[1].parse().unwrap_or(0);
    params
        .get(index.wrapping_sub(1))
        .cloned()
        .ok_or_else(|| query_error(QueryErrorKind::Syntax, sql, "missing parameter"))
}

fn lookup(reference: &str, scope: &Scope, sql: &str) -> Result<Value> {
    let caps = COLUMN
        .captures(reference.trim())
        .ok_or_else(|| query_error(QueryErrorKind::Syntax, sql, "expected column"))?;
    let table = caps.get(1).map(|m| m.as_str());
    let column = &caps[2];
    scope
        .iter()
        .find(|(t, c, _)| c == column && table.is_none_or(|table| t == table))
        .map(|(_, _, v)| v.clone())
        .ok_or_else(|| query_error(QueryErrorKind::NotFound, sql, "column does not exist"))
}

fn operand(token: &str, scope: &Scope, params: &[Value], sql: &str) -> Result<Value> {
    match token {
        "TRUE" => Ok(Value::Bool(true)),
        "FALSE" => Ok(Value::Bool(false)),
        _ if token.starts_with('$') => resolve_param(token, params, sql),
        _ => lookup(token, scope, sql),
    }
}

/// Split on `separator` outside parentheses.
fn split_top<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < input.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && input[i..].starts_with(separator) {
            parts.push(&input[start..i]);
            i += separator.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&input[start..]);
    parts
}

/// Whether `input` is wrapped in one pair of parentheses.
fn wrapped(input: &str) -> bool {
    if !(input.starts_with('(') && input.ends_with(')')) {
        return false;
    }
    let mut depth = 0_i32;
    for (i, byte) in input.bytes().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 && i != input.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

fn eval(condition: &str, scope: &Scope, params: &[Value], sql: &str) -> Result<bool> {
    let condition = condition.trim();
    if wrapped(condition) {
        return eval(&condition[1..condition.len() - 1], scope, params, sql);
    }

    let alternatives = split_top(condition, " OR ");
    if alternatives.len() > 1 {
        for alternative in alternatives {
            if eval(alternative, scope, params, sql)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    let conjuncts = split_top(condition, " AND ");
    if conjuncts.len() > 1 {
        for conjunct in conjuncts {
            if !eval(conjunct, scope, params, sql)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    match condition {
        "1 = 0" => return Ok(false),
        "1 = 1" => return Ok(true),
        _ => {}
    }

    if let Some(caps) = IN_LIST.captures(condition) {
        let left = operand(&caps[1], scope, params, sql)?;
        for token in split_top(&caps[2], ", ") {
            if operand(token.trim(), scope, params, sql)?.same_identity(&left) {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some(caps) = COMPARE.captures(condition) {
        let left = operand(&caps[1], scope, params, sql)?;
        let right = operand(&caps[3], scope, params, sql)?;
        let equal = !left.is_null() && left.same_identity(&right);
        return Ok(if &caps[2] == "=" { equal } else { !equal });
    }

    Err(query_error(QueryErrorKind::Syntax, sql, "unsupported condition"))
}

impl sqlrelate::Connection for FakeDb {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let outcome = self.run(sql, params, false);
        async move {
            outcome.map(|answer| match answer {
                Answer::Rows(rows) => rows,
                Answer::Affected(_) | Answer::Inserted(_) => Vec::new(),
            })
        }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let outcome = self.run(sql, params, false);
        async move {
            outcome.map(|answer| match answer {
                Answer::Rows(rows) => rows.into_iter().next(),
                Answer::Affected(_) | Answer::Inserted(_) => None,
            })
        }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let outcome = self.run(sql, params, false);
        async move {
            outcome.map(|answer| match answer {
                Answer::Rows(rows) => rows.len() as u64,
                Answer::Affected(n) => n,
                Answer::Inserted(_) => 1,
            })
        }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let outcome = self.run(sql, params, true);
        async move {
            outcome.map(|answer| match answer {
                Answer::Inserted(id) => id,
                Answer::Rows(_) | Answer::Affected(_) => 0,
            })
        }
    }
}
