//! Relation definition and its builder.
//!
//! A [`BelongsToMany`] is built once per parent/related pair and is immutable
//! afterwards. Builder calls that contradict each other (for example binding a
//! pivot model and also naming a pivot table) are recorded and reported by
//! [`BelongsToManyBuilder::build`], so the builder chain itself never fails.

use super::predicate::{Connector, PivotPredicate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlrelate_core::{ConfigErrorKind, Error, Model, Result, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

/// A record type backing a pivot table.
///
/// Binding one with [`BelongsToManyBuilder::pivot_model`] makes the model's
/// table and timestamp setting authoritative for the relation.
pub trait PivotModel: Model {
    /// Whether pivot rows carry `created_at` and `updated_at`.
    const TIMESTAMPS: bool = false;
}

/// Where pivot rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PivotTarget {
    /// A plain table managed by the relation.
    Table { name: String, timestamps: bool },
    /// A table owned by a bound [`PivotModel`].
    Model {
        type_name: &'static str,
        table: &'static str,
        timestamps: bool,
    },
}

impl PivotTarget {
    pub fn table(&self) -> &str {
        match self {
            PivotTarget::Table { name, .. } => name,
            PivotTarget::Model { table, .. } => table,
        }
    }

    pub fn timestamps(&self) -> bool {
        match self {
            PivotTarget::Table { timestamps, .. } | PivotTarget::Model { timestamps, .. } => {
                *timestamps
            }
        }
    }

    /// Name of the bound pivot model type, if any.
    pub fn model_name(&self) -> Option<&'static str> {
        match self {
            PivotTarget::Model { type_name, .. } => Some(*type_name),
            PivotTarget::Table { .. } => None,
        }
    }
}

/// The four columns that tie parent, pivot and related tables together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationKeys {
    /// Column on the parent table, usually its primary key.
    pub parent_key: String,
    /// Pivot column holding the parent key.
    pub foreign_pivot_key: String,
    /// Column on the related table, usually its primary key.
    pub related_key: String,
    /// Pivot column holding the related key.
    pub related_pivot_key: String,
}

/// Resolved, validated settings of a relation.
#[derive(Debug, Clone)]
pub struct PivotConfig {
    pub(crate) target: PivotTarget,
    pub(crate) keys: RelationKeys,
    pub(crate) extra_columns: Vec<String>,
    pub(crate) related_columns: Vec<String>,
    pub(crate) predicates: Vec<(Connector, PivotPredicate)>,
}

impl PivotConfig {
    pub fn target(&self) -> &PivotTarget {
        &self.target
    }

    pub fn pivot_table(&self) -> &str {
        self.target.table()
    }

    pub fn timestamps(&self) -> bool {
        self.target.timestamps()
    }

    pub fn has_pivot_model(&self) -> bool {
        self.target.model_name().is_some()
    }

    pub fn keys(&self) -> &RelationKeys {
        &self.keys
    }

    /// Extra pivot columns added with `with_pivot`, in call order.
    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    /// Related columns to select; empty means every column.
    pub fn related_columns(&self) -> &[String] {
        &self.related_columns
    }

    pub fn predicates(&self) -> &[(Connector, PivotPredicate)] {
        &self.predicates
    }
}

/// Relation settings that can be kept in a config file.
///
/// Applied through [`BelongsToManyBuilder::apply_settings`], which runs the
/// same builder calls a hand-written chain would, so conflicts with a bound
/// pivot model are detected the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationSettings {
    pub pivot_table: Option<String>,
    pub with_timestamps: bool,
    pub pivot_columns: Vec<String>,
    pub select: Vec<String>,
    pub parent_key: Option<String>,
    pub foreign_pivot_key: Option<String>,
    pub related_key: Option<String>,
    pub related_pivot_key: Option<String>,
}

impl RelationSettings {
    /// Parse settings from JSON.
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::config(
                ConfigErrorKind::InvalidSettings,
                "apply_settings",
                format!("invalid relation settings: {e}"),
            )
        })
    }
}

/// Many-to-many relation from `P` (parent) to `R` (related) through a pivot table.
///
/// Cheap to clone; the settings are shared.
pub struct BelongsToMany<P, R> {
    pub(crate) config: Arc<PivotConfig>,
    _marker: PhantomData<fn() -> (P, R)>,
}

impl<P, R> Clone for BelongsToMany<P, R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            _marker: PhantomData,
        }
    }
}

impl<P, R> fmt::Debug for BelongsToMany<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BelongsToMany")
            .field("parent", &std::any::type_name::<P>())
            .field("related", &std::any::type_name::<R>())
            .field("config", &self.config)
            .finish()
    }
}

impl<P: Model, R: Model> BelongsToMany<P, R> {
    /// Start configuring a relation with conventional defaults.
    pub fn builder() -> BelongsToManyBuilder<P, R> {
        BelongsToManyBuilder::new()
    }

    pub fn config(&self) -> &PivotConfig {
        &self.config
    }

    pub fn pivot_table(&self) -> &str {
        self.config.pivot_table()
    }

    pub fn keys(&self) -> &RelationKeys {
        &self.config.keys
    }
}

/// Consuming builder for [`BelongsToMany`].
pub struct BelongsToManyBuilder<P, R> {
    pivot_table: Option<String>,
    timestamps: bool,
    pivot_model: Option<PivotTarget>,
    extra_columns: Vec<String>,
    related_columns: Vec<String>,
    predicates: Vec<(Connector, PivotPredicate)>,
    parent_key: Option<String>,
    foreign_pivot_key: Option<String>,
    related_key: Option<String>,
    related_pivot_key: Option<String>,
    conflict: Option<Error>,
    _marker: PhantomData<fn() -> (P, R)>,
}

impl<P: Model, R: Model> Default for BelongsToManyBuilder<P, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Model, R: Model> BelongsToManyBuilder<P, R> {
    pub fn new() -> Self {
        Self {
            pivot_table: None,
            timestamps: false,
            pivot_model: None,
            extra_columns: Vec::new(),
            related_columns: Vec::new(),
            predicates: Vec::new(),
            parent_key: None,
            foreign_pivot_key: None,
            related_key: None,
            related_pivot_key: None,
            conflict: None,
            _marker: PhantomData,
        }
    }

    /// Keep the first conflicting call; later ones are reported by that one.
    fn record_conflict(&mut self, call: &'static str, message: &str) {
        if self.conflict.is_none() {
            tracing::debug!(call, message, "Relation builder conflict recorded");
            self.conflict = Some(Error::config(
                ConfigErrorKind::PivotModelConflict,
                call,
                message,
            ));
        }
    }

    /// Related columns to select. Replaces any previous selection.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Extra pivot columns to load with every related row. Appends.
    pub fn with_pivot<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Store pivot rows through the pivot model `M`.
    pub fn pivot_model<M: PivotModel>(mut self) -> Self {
        if self.pivot_table.is_some() {
            self.record_conflict(
                "pivot_model",
                "cannot bind a pivot model after defining a pivot table",
            );
            return self;
        }
        if self.timestamps {
            self.record_conflict(
                "pivot_model",
                "cannot bind a pivot model after enabling pivot timestamps",
            );
            return self;
        }
        self.pivot_model = Some(PivotTarget::Model {
            type_name: std::any::type_name::<M>(),
            table: M::TABLE_NAME,
            timestamps: M::TIMESTAMPS,
        });
        self
    }

    /// Override the pivot table name.
    pub fn pivot_collection(mut self, table: impl Into<String>) -> Self {
        if self.pivot_model.is_some() {
            self.record_conflict(
                "pivot_collection",
                "cannot define a pivot table when a pivot model is bound",
            );
            return self;
        }
        self.pivot_table = Some(table.into());
        self
    }

    /// Maintain `created_at` and `updated_at` on pivot rows.
    pub fn with_timestamps(mut self) -> Self {
        if self.pivot_model.is_some() {
            self.record_conflict(
                "with_timestamps",
                "cannot enable pivot timestamps when a pivot model is bound",
            );
            return self;
        }
        self.timestamps = true;
        self
    }

    /// Require `pivot.column = value`.
    pub fn where_pivot(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((
            Connector::And,
            PivotPredicate::Eq {
                column: column.into(),
                value: value.into(),
            },
        ));
        self
    }

    /// Alternatively accept `pivot.column = value`.
    pub fn or_where_pivot(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.push((
            Connector::Or,
            PivotPredicate::Eq {
                column: column.into(),
                value: value.into(),
            },
        ));
        self
    }

    /// Require `pivot.column IN (values)`.
    pub fn where_in_pivot<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.predicates.push((
            Connector::And,
            PivotPredicate::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
            },
        ));
        self
    }

    /// Require a verbatim SQL condition, typically over pivot columns.
    pub fn where_pivot_raw(mut self, sql: impl Into<String>) -> Self {
        self.predicates
            .push((Connector::And, PivotPredicate::Raw(sql.into())));
        self
    }

    pub fn parent_key(mut self, column: impl Into<String>) -> Self {
        self.parent_key = Some(column.into());
        self
    }

    pub fn foreign_pivot_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_pivot_key = Some(column.into());
        self
    }

    pub fn related_key(mut self, column: impl Into<String>) -> Self {
        self.related_key = Some(column.into());
        self
    }

    pub fn related_pivot_key(mut self, column: impl Into<String>) -> Self {
        self.related_pivot_key = Some(column.into());
        self
    }

    /// Apply stored settings on top of the calls made so far.
    pub fn apply_settings(mut self, settings: RelationSettings) -> Self {
        if let Some(table) = settings.pivot_table {
            self = self.pivot_collection(table);
        }
        if settings.with_timestamps {
            self = self.with_timestamps();
        }
        if !settings.pivot_columns.is_empty() {
            self = self.with_pivot(settings.pivot_columns);
        }
        if !settings.select.is_empty() {
            self = self.select(settings.select);
        }
        if let Some(key) = settings.parent_key {
            self = self.parent_key(key);
        }
        if let Some(key) = settings.foreign_pivot_key {
            self = self.foreign_pivot_key(key);
        }
        if let Some(key) = settings.related_key {
            self = self.related_key(key);
        }
        if let Some(key) = settings.related_pivot_key {
            self = self.related_pivot_key(key);
        }
        self
    }

    /// Resolve defaults and validate.
    #[allow(clippy::result_large_err)]
    pub fn build(self) -> Result<BelongsToMany<P, R>> {
        if let Some(conflict) = self.conflict {
            return Err(conflict);
        }

        let parent_key = self
            .parent_key
            .unwrap_or_else(|| default_key::<P>().to_string());
        let related_key = self
            .related_key
            .unwrap_or_else(|| default_key::<R>().to_string());
        let foreign_pivot_key = self
            .foreign_pivot_key
            .unwrap_or_else(|| default_foreign_key(P::TABLE_NAME, &parent_key));
        let related_pivot_key = self
            .related_pivot_key
            .unwrap_or_else(|| default_foreign_key(R::TABLE_NAME, &related_key));

        let target = match self.pivot_model {
            Some(target) => target,
            None => PivotTarget::Table {
                name: self
                    .pivot_table
                    .unwrap_or_else(|| default_pivot_table(P::TABLE_NAME, R::TABLE_NAME)),
                timestamps: self.timestamps,
            },
        };

        check_identifier("pivot_collection", target.table())?;
        check_identifier("parent_key", &parent_key)?;
        check_identifier("foreign_pivot_key", &foreign_pivot_key)?;
        check_identifier("related_key", &related_key)?;
        check_identifier("related_pivot_key", &related_pivot_key)?;
        for column in &self.extra_columns {
            check_identifier("with_pivot", column)?;
        }
        for column in &self.related_columns {
            if column != "*" {
                check_identifier("select", column)?;
            }
        }
        for (_, predicate) in &self.predicates {
            if let Some(column) = predicate.column() {
                check_identifier("where_pivot", column)?;
            }
        }

        let config = PivotConfig {
            target,
            keys: RelationKeys {
                parent_key,
                foreign_pivot_key,
                related_key,
                related_pivot_key,
            },
            extra_columns: self.extra_columns,
            related_columns: self.related_columns,
            predicates: self.predicates,
        };

        tracing::debug!(
            parent = P::TABLE_NAME,
            related = R::TABLE_NAME,
            pivot_table = config.pivot_table(),
            "Built belongs-to-many relation"
        );

        Ok(BelongsToMany {
            config: Arc::new(config),
            _marker: PhantomData,
        })
    }
}

fn default_key<M: Model>() -> &'static str {
    M::PRIMARY_KEY.first().copied().unwrap_or("id")
}

fn identifier_regex() -> Option<&'static Regex> {
    static IDENTIFIER: OnceLock<Option<Regex>> = OnceLock::new();
    IDENTIFIER
        .get_or_init(|| match Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$") {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::warn!(error = %e, "Identifier pattern failed to compile");
                None
            }
        })
        .as_ref()
}

#[allow(clippy::result_large_err)]
fn check_identifier(call: &'static str, name: &str) -> Result<()> {
    let valid = match identifier_regex() {
        Some(regex) => regex.is_match(name),
        None => !name.is_empty(),
    };
    if valid {
        Ok(())
    } else {
        Err(Error::config(
            ConfigErrorKind::InvalidIdentifier,
            call,
            format!("'{name}' is not a valid SQL identifier"),
        ))
    }
}

/// Naive English singular of a table name: `categories` -> `category`,
/// `posts` -> `post`, `address` stays as is.
pub(crate) fn singular(table: &str) -> String {
    if let Some(stem) = table.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{stem}y");
        }
    }
    if table.ends_with("ss") {
        return table.to_string();
    }
    match table.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => table.to_string(),
    }
}

/// `users` + `id` -> `user_id`.
pub(crate) fn default_foreign_key(table: &str, key: &str) -> String {
    format!("{}_{key}", singular(table))
}

/// Singular table names in lexical order joined by `_`: `users` + `posts` -> `post_user`.
pub(crate) fn default_pivot_table(parent_table: &str, related_table: &str) -> String {
    let mut names = [singular(parent_table), singular(related_table)];
    names.sort();
    names.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrelate_core::Row;

    struct User;
    struct Post;
    struct PostUser;

    impl Model for User {
        const TABLE_NAME: &'static str = "users";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
        fn from_row(_row: &Row) -> Result<Self> {
            Ok(User)
        }
        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }
        fn is_new(&self) -> bool {
            false
        }
    }

    impl Model for Post {
        const TABLE_NAME: &'static str = "posts";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
        fn from_row(_row: &Row) -> Result<Self> {
            Ok(Post)
        }
        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }
        fn is_new(&self) -> bool {
            false
        }
    }

    impl Model for PostUser {
        const TABLE_NAME: &'static str = "post_memberships";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];
        fn to_row(&self) -> Vec<(&'static str, Value)> {
            Vec::new()
        }
        fn from_row(_row: &Row) -> Result<Self> {
            Ok(PostUser)
        }
        fn primary_key_value(&self) -> Vec<Value> {
            Vec::new()
        }
        fn is_new(&self) -> bool {
            false
        }
    }

    impl PivotModel for PostUser {
        const TIMESTAMPS: bool = true;
    }

    fn conflict_call(result: Result<BelongsToMany<User, Post>>) -> Option<&'static str> {
        match result {
            Err(Error::Config(e)) if e.kind == ConfigErrorKind::PivotModelConflict => e.call,
            _ => None,
        }
    }

    #[test]
    fn conventional_defaults() {
        let rel = BelongsToMany::<User, Post>::builder()
            .build()
            .expect("defaults are valid");
        assert_eq!(rel.pivot_table(), "post_user");
        let keys = rel.keys();
        assert_eq!(keys.parent_key, "id");
        assert_eq!(keys.foreign_pivot_key, "user_id");
        assert_eq!(keys.related_key, "id");
        assert_eq!(keys.related_pivot_key, "post_id");
        assert!(!rel.config().timestamps());
        assert!(rel.config().related_columns().is_empty());
    }

    #[test]
    fn singular_rules() {
        assert_eq!(singular("categories"), "category");
        assert_eq!(singular("posts"), "post");
        assert_eq!(singular("address"), "address");
        assert_eq!(singular("staff"), "staff");
        assert_eq!(default_pivot_table("users", "categories"), "category_user");
    }

    #[test]
    fn select_overwrites_and_with_pivot_appends() {
        let rel = BelongsToMany::<User, Post>::builder()
            .select(["id", "body"])
            .select(["id", "title"])
            .with_pivot(["role"])
            .with_pivot(vec!["rank".to_string()])
            .build()
            .expect("valid");
        assert_eq!(rel.config().related_columns(), &["id", "title"]);
        assert_eq!(rel.config().extra_columns(), &["role", "rank"]);
    }

    #[test]
    fn pivot_model_owns_table_and_timestamps() {
        let rel = BelongsToMany::<User, Post>::builder()
            .pivot_model::<PostUser>()
            .build()
            .expect("valid");
        assert_eq!(rel.pivot_table(), "post_memberships");
        assert!(rel.config().timestamps());
        assert!(rel.config().has_pivot_model());
    }

    #[test]
    fn pivot_model_conflicts_in_either_order() {
        let after_model = BelongsToMany::<User, Post>::builder()
            .pivot_model::<PostUser>()
            .pivot_collection("memberships")
            .build();
        assert_eq!(conflict_call(after_model), Some("pivot_collection"));

        let before_model = BelongsToMany::<User, Post>::builder()
            .pivot_collection("memberships")
            .pivot_model::<PostUser>()
            .build();
        assert_eq!(conflict_call(before_model), Some("pivot_model"));

        let timestamps_after = BelongsToMany::<User, Post>::builder()
            .pivot_model::<PostUser>()
            .with_timestamps()
            .build();
        assert_eq!(conflict_call(timestamps_after), Some("with_timestamps"));

        let timestamps_before = BelongsToMany::<User, Post>::builder()
            .with_timestamps()
            .pivot_model::<PostUser>()
            .build();
        assert_eq!(conflict_call(timestamps_before), Some("pivot_model"));
    }

    #[test]
    fn first_conflict_is_reported() {
        let result = BelongsToMany::<User, Post>::builder()
            .pivot_model::<PostUser>()
            .with_timestamps()
            .pivot_collection("memberships")
            .build();
        assert_eq!(conflict_call(result), Some("with_timestamps"));
    }

    #[test]
    fn rejects_bad_identifiers() {
        let result = BelongsToMany::<User, Post>::builder()
            .with_pivot(["role; DROP TABLE users"])
            .build();
        match result {
            Err(Error::Config(e)) => {
                assert_eq!(e.kind, ConfigErrorKind::InvalidIdentifier);
                assert_eq!(e.call, Some("with_pivot"));
            }
            other => panic!("expected identifier error, got {other:?}"),
        }

        let star = BelongsToMany::<User, Post>::builder().select(["*"]).build();
        assert!(star.is_ok());
    }

    #[test]
    fn settings_from_json() {
        let settings = RelationSettings::from_json(
            r#"{"pivot_table": "memberships", "with_timestamps": true, "pivot_columns": ["role"]}"#,
        )
        .expect("valid settings");
        let rel = BelongsToMany::<User, Post>::builder()
            .apply_settings(settings)
            .build()
            .expect("valid");
        assert_eq!(rel.pivot_table(), "memberships");
        assert!(rel.config().timestamps());
        assert_eq!(rel.config().extra_columns(), &["role"]);
    }

    #[test]
    fn settings_conflict_with_pivot_model() {
        let settings = RelationSettings {
            pivot_table: Some("memberships".to_string()),
            ..RelationSettings::default()
        };
        let result = BelongsToMany::<User, Post>::builder()
            .pivot_model::<PostUser>()
            .apply_settings(settings)
            .build();
        assert_eq!(conflict_call(result), Some("pivot_collection"));
    }

    #[test]
    fn unknown_setting_is_rejected() {
        let err = RelationSettings::from_json(r#"{"pivot": "x"}"#).unwrap_err();
        assert!(err.is_usage_error());
    }
}
