//! Schemas: field declarations compiled into transformer pipelines.
//!
//! A [`Schema`] maps dotted paths to [`FieldType`]s. Every registered path appends one
//! [`Transformer`] to each of the four pipelines:
//!
//! | stage | runs | field method |
//! |---|---|---|
//! | [`Stage::Getter`] | when a document is materialized | [`FieldType::cast`] |
//! | [`Stage::Setter`] | before a document is written | [`FieldType::validate`] |
//! | [`Stage::Import`] | when a snapshot is loaded | [`FieldType::parse`] |
//! | [`Stage::Export`] | when a document is exported | [`FieldType::serialize`] |
//!
//! Pipelines run in registration order. The schema also owns the lifecycle hooks, the instance
//! and static methods, the named `$where` predicates, and the entry points of the query, update,
//! sort and population compilers.
//!
//! # Example
//!
//! ```ignore
//! use docvault_core::{schema::{Definition, Schema}, types::{FieldOptions, TypeName}};
//!
//! let mut schema = Schema::new();
//! schema.path("title", Definition::Typed(TypeName::String, FieldOptions::new().required()))?;
//! schema.path("tags", Definition::Array(vec![Definition::Type(TypeName::String)]))?;
//! schema.path("meta", Definition::Nested(vec![
//!     ("lang".into(), Definition::Type(TypeName::String)),
//! ]))?;
//! ```

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use bson::{Bson, Document};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::{
    collection::{Collection, StaticMethod},
    error::{StoreError, StoreResult},
    hook::{Hook, HookPhase, HookType},
    populate::{IntoPopulate, Population, resolve_populate},
    query::{IntoQuery, Predicate, QueryCompiler},
    record::Record,
    sort::{CompiledSort, IntoSort},
    types::{
        Encoding, FieldOptions, FieldType, MixedType, TypeName, VirtualType, construct,
    },
    update::{CompiledUpdate, IntoUpdate},
    value::{self, get_path, remove_path, set_path},
};

/// Signature of instance methods.
pub type Method = Arc<dyn Fn(&dyn Record, Vec<Bson>) -> StoreResult<Bson> + Send + Sync>;

/// A field declaration.
#[derive(Clone)]
pub enum Definition {
    /// A builtin type with default options.
    Type(TypeName),
    /// A builtin type with options.
    Typed(TypeName, FieldOptions),
    /// A prebuilt field type, registered as is.
    Custom(Arc<dyn FieldType>),
    /// An array literal. The first element, if any, declares the element type.
    Array(Vec<Definition>),
    /// A sub-schema. Its paths are registered under the parent path.
    Nested(Vec<(String, Definition)>),
}

impl Definition {
    /// Reads a declaration from its JSON form.
    ///
    /// ```ignore
    /// let def = Definition::from_json(&json!({
    ///     "title": { "type": "String", "required": true },
    ///     "tags": ["String"],
    ///     "meta": { "lang": "String" },
    /// }))?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSchema`] for unknown type names, malformed options, and
    /// values that are neither a type name, a list nor an object.
    pub fn from_json(value: &Value) -> StoreResult<Definition> {
        match value {
            Value::String(name) => Ok(Definition::Type(name.parse::<TypeName>()?)),
            Value::Array(items) => Ok(Definition::Array(
                items.iter().map(Definition::from_json).collect::<StoreResult<_>>()?,
            )),
            Value::Object(map) => match map.get("type") {
                Some(Value::String(name)) => {
                    Ok(Definition::Typed(name.parse::<TypeName>()?, options_from_json(map)?))
                }
                _ => Ok(Definition::Nested(
                    map.iter()
                        .map(|(key, value)| -> StoreResult<(String, Definition)> {
                            Ok((key.clone(), Definition::from_json(value)?))
                        })
                        .collect::<StoreResult<_>>()?,
                )),
            },
            other => Err(StoreError::InvalidSchema(format!("Invalid schema definition `{other}`"))),
        }
    }
}

fn options_from_json(map: &serde_json::Map<String, Value>) -> StoreResult<FieldOptions> {
    let mut options = FieldOptions::new();

    for (key, raw) in map {
        match (key.as_str(), raw) {
            ("type", _) => {}
            ("required", Value::Bool(required)) => options.required = *required,
            ("default", default) => options = options.default_value(value::from_json(default.clone())),
            ("encoding", Value::String(encoding)) => {
                options = options.encoding(encoding.parse::<Encoding>()?)
            }
            ("elements", Value::Array(elements)) => {
                options = options.elements(elements.iter().cloned().map(value::from_json))
            }
            ("ref", Value::String(model)) => options = options.reference(model.clone()),
            (key, raw) => {
                return Err(StoreError::InvalidSchema(format!("Invalid option `{key}`: {raw}")));
            }
        }
    }

    Ok(options)
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Definition::Type(kind) => f.debug_tuple("Type").field(kind).finish(),
            Definition::Typed(kind, options) => {
                f.debug_tuple("Typed").field(kind).field(options).finish()
            }
            Definition::Custom(field) => f.debug_tuple("Custom").field(&field.kind()).finish(),
            Definition::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Definition::Nested(fields) => f.debug_tuple("Nested").field(fields).finish(),
        }
    }
}

/// The four pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Getter,
    Setter,
    Import,
    Export,
}

/// One pipeline entry: a registered path and the field type handling it.
#[derive(Debug, Clone)]
pub struct Transformer {
    pub stage: Stage,
    pub path: String,
    pub field: Arc<dyn FieldType>,
}

impl Transformer {
    fn apply(&self, data: &mut Document) -> StoreResult<()> {
        let path = self.path.as_str();
        let current = get_path(data, path).cloned();

        match self.stage {
            Stage::Getter => {
                if let Some(value) = self.field.cast(current, data)? {
                    set_path(data, path, value);
                }
            }
            Stage::Setter => match self.field.validate(current, data)? {
                Some(value) => set_path(data, path, value),
                None => {
                    remove_path(data, path);
                }
            },
            Stage::Import => {
                if let Some(value) = self.field.parse(current)? {
                    set_path(data, path, value);
                }
            }
            Stage::Export => match self.field.serialize(current) {
                Some(value) => set_path(data, path, value),
                None => {
                    remove_path(data, path);
                }
            },
        }

        Ok(())
    }
}

#[derive(Default)]
struct Pipelines {
    getter: Vec<Transformer>,
    setter: Vec<Transformer>,
    import: Vec<Transformer>,
    export: Vec<Transformer>,
}

impl Pipelines {
    fn stage(&self, stage: Stage) -> &[Transformer] {
        match stage {
            Stage::Getter => &self.getter,
            Stage::Setter => &self.setter,
            Stage::Import => &self.import,
            Stage::Export => &self.export,
        }
    }

    fn push(&mut self, path: &str, field: &Arc<dyn FieldType>) {
        let entry = |stage| Transformer { stage, path: path.to_string(), field: field.clone() };

        self.getter.push(entry(Stage::Getter));
        self.setter.push(entry(Stage::Setter));
        self.import.push(entry(Stage::Import));
        self.export.push(entry(Stage::Export));
    }
}

/// A compiled collection schema.
#[derive(Default)]
pub struct Schema {
    paths: HashMap<String, Arc<dyn FieldType>>,
    order: Vec<String>,
    pipelines: Pipelines,
    hooks: HashMap<(HookPhase, HookType), Vec<Arc<dyn Hook>>>,
    methods: HashMap<String, Method>,
    statics: HashMap<String, StaticMethod>,
    predicates: HashMap<String, Predicate>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from top-level declarations.
    pub fn from_definition(
        definition: impl IntoIterator<Item = (String, Definition)>,
    ) -> StoreResult<Self> {
        let mut schema = Schema::new();
        schema.add(definition, "")?;
        Ok(schema)
    }

    /// Builds a schema from its JSON declaration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidSchema`] when `value` is not an object of declarations.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        match Definition::from_json(value)? {
            Definition::Nested(fields) => Schema::from_definition(fields),
            _ => Err(StoreError::InvalidSchema("Schema must be an object".into())),
        }
    }

    /// Registers every declaration, prefixing each name with `prefix`.
    pub fn add(
        &mut self,
        definition: impl IntoIterator<Item = (String, Definition)>,
        prefix: &str,
    ) -> StoreResult<()> {
        for (name, def) in definition {
            self.path(&format!("{prefix}{name}"), def)?;
        }

        Ok(())
    }

    /// Registers `def` under `name` and returns the resulting field type.
    ///
    /// A nested definition registers an object marker at `name`, then its sub-paths under
    /// `name.`.
    pub fn path(&mut self, name: &str, def: Definition) -> StoreResult<Arc<dyn FieldType>> {
        if name.is_empty() {
            return Err(StoreError::InvalidSchema("Schema path must have a name".into()));
        }

        let (field, nested) = match def {
            Definition::Nested(fields) => {
                (construct(TypeName::Object, name, FieldOptions::new()), fields)
            }
            other => (build(name, other)?, Vec::new()),
        };

        self.register(name, field.clone());

        if !nested.is_empty() {
            self.add(nested, &format!("{name}."))?;
        }

        Ok(field)
    }

    fn register(&mut self, name: &str, field: Arc<dyn FieldType>) {
        self.pipelines.push(name, &field);

        if self.paths.insert(name.to_string(), field).is_none() {
            self.order.push(name.to_string());
        }

        log::trace!("registered `{name}`; pipelines hold {} entries", self.pipelines.getter.len());
    }

    /// Returns the field type registered under `name`.
    pub fn field(&self, name: &str) -> Option<&Arc<dyn FieldType>> {
        self.paths.get(name)
    }

    /// Returns the field type registered under `path`, or an untyped one.
    pub fn field_or_mixed(&self, path: &str) -> Arc<dyn FieldType> {
        self.paths
            .get(path)
            .cloned()
            .unwrap_or_else(|| Arc::new(MixedType::new(path, FieldOptions::new())))
    }

    /// Registered paths in registration order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &Arc<dyn FieldType>)> {
        self.order.iter().filter_map(|name| Some((name.as_str(), self.paths.get(name)?)))
    }

    /// Registers a computed path and returns it so a setter can be attached.
    ///
    /// ```ignore
    /// schema
    ///     .virtual_path("full_name", |record| {
    ///         let first = record.get_value("first")?;
    ///         let last = record.get_value("last")?;
    ///         Some(format!("{} {}", first.as_str()?, last.as_str()?).into())
    ///     })
    ///     .set(|data, value| {
    ///         // split `value` back into `first` and `last`
    ///     });
    /// ```
    pub fn virtual_path<F>(&mut self, name: &str, getter: F) -> Arc<VirtualType>
    where
        F: Fn(&dyn Record) -> Option<Bson> + Send + Sync + 'static,
    {
        let field = Arc::new(VirtualType::new(name));
        field.get(getter);
        self.register(name, field.clone());
        field
    }

    /// Paths with computed accessors.
    pub fn virtual_paths(&self) -> impl Iterator<Item = (&str, &Arc<dyn FieldType>)> {
        self.paths().filter(|(_, field)| field.accessor().is_some())
    }

    /// Adds a hook run before `kind` (`"save"` or `"remove"`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHook`] for any other kind.
    pub fn pre(&mut self, kind: &str, hook: Arc<dyn Hook>) -> StoreResult<()> {
        self.hook(HookPhase::Pre, kind, hook)
    }

    /// Adds a hook run after `kind` (`"save"` or `"remove"`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidHook`] for any other kind.
    pub fn post(&mut self, kind: &str, hook: Arc<dyn Hook>) -> StoreResult<()> {
        self.hook(HookPhase::Post, kind, hook)
    }

    fn hook(&mut self, phase: HookPhase, kind: &str, hook: Arc<dyn Hook>) -> StoreResult<()> {
        let kind = kind.parse::<HookType>()?;
        self.hooks.entry((phase, kind)).or_default().push(hook);
        Ok(())
    }

    pub fn hooks(&self, phase: HookPhase, kind: HookType) -> &[Arc<dyn Hook>] {
        self.hooks.get(&(phase, kind)).map(Vec::as_slice).unwrap_or_default()
    }

    /// Adds an instance method, callable on every document of collections using this schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMethod`] when `name` is empty.
    pub fn method<F>(&mut self, name: impl Into<String>, method: F) -> StoreResult<()>
    where
        F: Fn(&dyn Record, Vec<Bson>) -> StoreResult<Bson> + Send + Sync + 'static,
    {
        let name = required_name(name.into())?;
        self.methods.insert(name, Arc::new(method));
        Ok(())
    }

    pub fn get_method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Adds a static method, called with the collection it is invoked on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMethod`] when `name` is empty.
    pub fn statics<F, Fut>(&mut self, name: impl Into<String>, method: F) -> StoreResult<()>
    where
        F: Fn(Arc<dyn Collection>, Vec<Bson>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StoreResult<Bson>> + Send + 'static,
    {
        let name = required_name(name.into())?;
        let wrapped: StaticMethod = Arc::new(
            move |collection: Arc<dyn Collection>, args: Vec<Bson>| -> BoxFuture<'static, StoreResult<Bson>> {
                Box::pin(method(collection, args))
            },
        );
        self.statics.insert(name, wrapped);
        Ok(())
    }

    pub fn get_static(&self, name: &str) -> Option<&StaticMethod> {
        self.statics.get(name)
    }

    /// Registers a predicate that `$where` clauses can refer to by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidMethod`] when `name` is empty.
    pub fn predicate<F>(&mut self, name: impl Into<String>, predicate: F) -> StoreResult<()>
    where
        F: Fn(&dyn Record) -> bool + Send + Sync + 'static,
    {
        let name = required_name(name.into())?;
        self.predicates.insert(name, Arc::new(predicate));
        Ok(())
    }

    pub fn predicate_named(&self, name: &str) -> Option<Predicate> {
        self.predicates.get(name).cloned()
    }

    /// Declares `_id` as a required CUID unless the schema already has one.
    pub fn ensure_id(&mut self) {
        if !self.paths.contains_key("_id") {
            let field = construct(TypeName::Cuid, "_id", FieldOptions::new().required());
            self.register("_id", field);
        }
    }

    pub fn pipeline(&self, stage: Stage) -> &[Transformer] {
        self.pipelines.stage(stage)
    }

    fn run(&self, stage: Stage, data: &mut Document) -> StoreResult<()> {
        self.pipeline(stage).iter().try_for_each(|transformer| transformer.apply(data))
    }

    /// Casts stored values and fills defaults.
    pub fn apply_getters(&self, data: &mut Document) -> StoreResult<()> {
        self.run(Stage::Getter, data)
    }

    /// Validates `data` in place before it is written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] naming the first path that fails.
    pub fn apply_setters(&self, data: &mut Document) -> StoreResult<()> {
        self.run(Stage::Setter, data)
    }

    /// Restores runtime values from a snapshot record.
    pub fn parse_database(&self, data: &mut Document) -> StoreResult<()> {
        self.run(Stage::Import, data)
    }

    /// Converts runtime values into their snapshot form.
    pub fn export_database(&self, data: &mut Document) -> StoreResult<()> {
        self.run(Stage::Export, data)
    }

    /// Compiles a query into a predicate over records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for malformed queries, unsupported operators, and
    /// `$where` names without a registered predicate.
    pub fn compile_query(&self, query: impl IntoQuery) -> StoreResult<Predicate> {
        let expr = query.into_query()?;
        QueryCompiler::new(self).compile(&expr)
    }

    /// Compiles an update expression into a mutator.
    pub fn compile_update(&self, update: impl IntoUpdate) -> StoreResult<CompiledUpdate> {
        CompiledUpdate::compile(self, update.into_update()?)
    }

    /// Compiles a sort specification into a comparator.
    pub fn compile_sort(&self, sort: impl IntoSort) -> StoreResult<CompiledSort> {
        Ok(CompiledSort::compile(self, sort.into_sort()?))
    }

    /// Normalizes a population expression, deriving missing models from `ref` options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Population`] when an entry has no path, or no model and no
    /// reference to derive one from.
    pub fn parse_populate(&self, expr: impl IntoPopulate) -> StoreResult<Vec<Population>> {
        resolve_populate(self, expr.into_populate()?)
    }
}

fn required_name(name: String) -> StoreResult<String> {
    if name.is_empty() {
        return Err(StoreError::InvalidMethod("Method name is required".into()));
    }

    Ok(name)
}

fn build(name: &str, def: Definition) -> StoreResult<Arc<dyn FieldType>> {
    let field = match def {
        Definition::Type(kind) => construct(kind, name, FieldOptions::new()),
        Definition::Typed(kind, options) => construct(kind, name, options),
        Definition::Custom(field) => field,
        Definition::Array(items) => {
            let child = match items.into_iter().next() {
                Some(Definition::Nested(_)) => construct(TypeName::Object, name, FieldOptions::new()),
                Some(item) => build(name, item)?,
                None => construct(TypeName::Mixed, name, FieldOptions::new()),
            };
            construct(TypeName::Array, name, FieldOptions::new().child(child))
        }
        Definition::Nested(_) => construct(TypeName::Object, name, FieldOptions::new()),
    };

    Ok(field)
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("paths", &self.paths().map(|(name, field)| (name, field.kind())).collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook;
    use bson::{DateTime, doc, spec::BinarySubtype};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_json(&json!({
            "title": { "type": "String", "required": true },
            "views": { "type": "Number", "default": 0 },
            "tags": ["String"],
            "meta": { "lang": "String", "size": "Integer" },
            "created": "Date",
            "cover": { "type": "Buffer", "encoding": "base64" },
        }))
        .unwrap()
    }

    #[test]
    fn nested_definitions_register_dotted_paths() {
        let schema = schema();
        let names = schema.paths().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["title", "views", "tags", "meta", "meta.lang", "meta.size", "created", "cover"]
        );
        assert_eq!(schema.field("meta").unwrap().kind(), TypeName::Object);
        assert_eq!(schema.field("tags").unwrap().child().unwrap().kind(), TypeName::String);
        assert_eq!(schema.pipeline(Stage::Getter).len(), 8);
        assert_eq!(schema.pipeline(Stage::Export)[4].path, "meta.lang");
    }

    #[test]
    fn empty_nested_definitions_only_register_the_marker() {
        let mut schema = Schema::new();
        schema.path("extra", Definition::Nested(Vec::new())).unwrap();
        assert_eq!(schema.paths().count(), 1);
    }

    #[test]
    fn invalid_declarations_are_rejected() {
        assert!(Definition::from_json(&json!(42)).is_err());
        assert!(Definition::from_json(&json!({ "type": "Symbol" })).is_err());
        assert!(Definition::from_json(&json!({ "type": "String", "unique": true })).is_err());
        assert!(Schema::from_json(&json!("String")).is_err());
    }

    #[test]
    fn getters_fill_defaults() {
        let mut data = doc! { "title": "a" };
        schema().apply_getters(&mut data).unwrap();
        assert_eq!(data, doc! { "title": "a", "views": 0_i64, "tags": [], "meta": {} });
    }

    #[test]
    fn setters_validate_and_name_the_path() {
        let schema = schema();
        let err = schema.apply_setters(&mut doc! { "views": 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref path, .. } if path == "title"));

        let err = schema
            .apply_setters(&mut doc! { "title": "a", "meta": { "size": 1.5 } })
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref path, .. } if path == "meta.size"));
    }

    #[test]
    fn export_then_import_restores_dates_and_buffers() {
        let schema = schema();
        let created = DateTime::from_millis(1_700_000_000_123);
        let cover = Bson::Binary(bson::Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 255] });
        let original = doc! { "title": "a", "created": created, "cover": cover };

        let mut data = original.clone();
        schema.export_database(&mut data).unwrap();
        assert!(matches!(data.get("created"), Some(Bson::String(_))));
        assert_eq!(data.get_str("cover").unwrap(), "AQL/");

        schema.parse_database(&mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn ensure_id_declares_a_required_cuid() {
        let mut schema = schema();
        schema.ensure_id();
        schema.ensure_id();
        assert_eq!(schema.field("_id").unwrap().kind(), TypeName::Cuid);
        assert_eq!(schema.paths().filter(|(name, _)| *name == "_id").count(), 1);

        let mut data = doc! { "title": "a" };
        schema.apply_getters(&mut data).unwrap();
        assert_eq!(data.get_str("_id").unwrap().len(), 25);
    }

    #[test]
    fn virtual_paths_are_computed_and_never_stored() {
        let mut schema = Schema::new();
        schema.path("first", Definition::Type(TypeName::String)).unwrap();
        schema.virtual_path("upper", |record| {
            record.get_value("first").and_then(|first| first.as_str().map(str::to_uppercase)).map(Bson::from)
        });

        let field = schema.field("upper").unwrap();
        let getter = field.accessor().unwrap();
        assert_eq!(getter(&doc! { "first": "ann" }), Some(Bson::from("ANN")));
        assert_eq!(schema.virtual_paths().count(), 1);

        let mut data = doc! { "first": "ann", "upper": "stale" };
        schema.apply_setters(&mut data).unwrap();
        assert_eq!(data, doc! { "first": "ann" });
    }

    #[test]
    fn hooks_are_registered_by_kind() {
        let mut schema = Schema::new();
        schema.pre("save", hook::from_fn(|_| Ok(()))).unwrap();
        schema.post("remove", hook::from_fn(|_| Ok(()))).unwrap();

        assert_eq!(schema.hooks(HookPhase::Pre, HookType::Save).len(), 1);
        assert_eq!(schema.hooks(HookPhase::Post, HookType::Save).len(), 0);
        assert_eq!(schema.hooks(HookPhase::Post, HookType::Remove).len(), 1);
        assert!(matches!(
            schema.pre("update", hook::from_fn(|_| Ok(()))),
            Err(StoreError::InvalidHook(_))
        ));
    }

    #[test]
    fn methods_require_a_name() {
        let mut schema = Schema::new();
        assert!(matches!(
            schema.method("", |_, _| Ok(Bson::Null)),
            Err(StoreError::InvalidMethod(_))
        ));
        assert!(matches!(
            schema.statics("", |_, _| async { Ok(Bson::Null) }),
            Err(StoreError::InvalidMethod(_))
        ));

        schema.method("title", |record, _| Ok(record.get_value("title").unwrap_or(Bson::Null))).unwrap();
        let method = schema.get_method("title").unwrap();
        assert_eq!(method(&doc! { "title": "a" }, Vec::new()).unwrap(), Bson::from("a"));
    }
}
