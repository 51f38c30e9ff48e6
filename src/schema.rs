//! Schema modeling and type resolution.
//!
//! A [`ClassSchema`] is the ordered list of (member name, member type)
//! pairs describing one type's serializable surface, together with the
//! type's name and optional library (module identity). Schemas are
//! immutable once built and shared through `Arc`.
//!
//! The [`TypeRegistry`] maps wire-level type descriptors back to
//! registered schemas. There is no dynamic loading: a name that was
//! never registered (and that no binder can remap) is a fatal
//! [`TypeResolution`](crate::KnotcodeError::TypeResolution) failure.
//! Registration is explicit and the lookup caches are append-only, so
//! one registry can safely serve concurrent encode/decode operations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{KnotcodeError, Result};
use crate::format::{PrimitiveTag, TypeTag};
use crate::hooks::Binder;

/// One member's wire-level type declaration. Maps 1:1 onto the on-wire
/// type-tag byte plus its additional-info payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberType {
    /// A fixed primitive type; the value is carried inline, untagged.
    Primitive(PrimitiveTag),
    /// A string reference.
    Str,
    /// Any object reference; the concrete type travels per value.
    Object,
    /// An object of a core-library class, identified by name only.
    SystemClass(String),
    /// An object of a library-qualified class.
    Class {
        /// The class name.
        name: String,
        /// The module identity the class lives in.
        library: String,
    },
    /// An array of object references.
    ObjectArray,
    /// An array of strings.
    StringArray,
    /// An array of one primitive type.
    PrimitiveArray(PrimitiveTag),
}

impl MemberType {
    /// The wire type-tag byte for this declaration.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Primitive(_) => TypeTag::Primitive,
            Self::Str => TypeTag::String,
            Self::Object => TypeTag::Object,
            Self::SystemClass(_) => TypeTag::SystemClass,
            Self::Class { .. } => TypeTag::Class,
            Self::ObjectArray => TypeTag::ObjectArray,
            Self::StringArray => TypeTag::StringArray,
            Self::PrimitiveArray(_) => TypeTag::PrimitiveArray,
        }
    }

    /// Whether values of this declaration are carried as raw inline
    /// primitive bytes rather than as records.
    pub fn is_inline_primitive(&self) -> bool {
        matches!(self, Self::Primitive(_))
    }
}

/// One (member name, member type) pair of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSchema {
    /// The member's name as it appears on the wire.
    pub name: String,
    /// The member's declared type.
    pub ty: MemberType,
}

/// The serializable description of one concrete type.
///
/// `library == None` marks a core-library type (resolved through the
/// registry's default table and emitted without a library record).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSchema {
    /// The type's name.
    pub name: String,
    /// The module identity, or `None` for core-library types.
    pub library: Option<String>,
    /// Ordered serializable members.
    pub members: Vec<MemberSchema>,
    /// Value-type instances take ids from the reserved negative range
    /// and are never shared or back-referenced.
    pub value_type: bool,
}

impl ClassSchema {
    /// Starts a schema for a core-library type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            library: None,
            members: Vec::new(),
            value_type: false,
        }
    }

    /// Assigns the library (module identity) this type lives in.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = Some(library.into());
        self
    }

    /// Appends a member declaration.
    pub fn with_member(mut self, name: impl Into<String>, ty: MemberType) -> Self {
        self.members.push(MemberSchema {
            name: name.into(),
            ty,
        });
        self
    }

    /// Marks instances of this type as value-typed (negative id range).
    pub fn as_value_type(mut self) -> Self {
        self.value_type = true;
        self
    }

    /// Position of a member by name.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Checks that every member of `self` is present in a schema read
    /// off the wire. Members are matched by name; a missing member is a
    /// schema mismatch.
    pub fn check_against_wire(&self, wire: &ClassSchema) -> Result<()> {
        for member in &self.members {
            if wire.member_index(&member.name).is_none() {
                return Err(KnotcodeError::SchemaMismatch(format!(
                    "member `{}` of type `{}` is absent from the wire schema",
                    member.name, self.name
                )));
            }
        }
        Ok(())
    }
}

/// A capability returning the ordered member list for a concrete type.
///
/// The registry is the default provider; callers with their own
/// introspection or registration machinery can plug in an alternative.
pub trait TypeSchemaProvider: Send + Sync {
    /// Returns the schema for `(name, library)` if this provider knows
    /// the type.
    fn class_schema(&self, name: &str, library: Option<&str>) -> Option<Arc<ClassSchema>>;
}

/// The explicit, engine-owned type table.
///
/// Lookup falls through: binder remap first, then the exact
/// (name, library) entry, then a same-name search of the core table.
/// Results are memoized by the post-binder qualified name, so the memo
/// table never carries one operation's remaps into the next;
/// all maps are append-only with
/// insert-if-absent semantics, so entries are never mutated once
/// published and concurrent operations cannot corrupt them.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    qualified: RwLock<HashMap<(String, String), Arc<ClassSchema>>>,
    core: RwLock<HashMap<String, Arc<ClassSchema>>>,
    resolve_cache: RwLock<HashMap<String, Arc<ClassSchema>>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema. If an entry for the same key already exists
    /// the existing entry wins (insert-if-absent) and is returned.
    pub fn register(&self, schema: ClassSchema) -> Arc<ClassSchema> {
        let schema = Arc::new(schema);
        match &schema.library {
            Some(lib) => {
                let key = (schema.name.clone(), lib.clone());
                let mut map = self
                    .qualified
                    .write()
                    .unwrap_or_else(|poison| poison.into_inner());
                Arc::clone(map.entry(key).or_insert_with(|| Arc::clone(&schema)))
            }
            None => {
                let mut map = self
                    .core
                    .write()
                    .unwrap_or_else(|poison| poison.into_inner());
                Arc::clone(
                    map.entry(schema.name.clone())
                        .or_insert_with(|| Arc::clone(&schema)),
                )
            }
        }
    }

    /// Resolves a wire-level (name, module-identity) descriptor to a
    /// registered schema.
    ///
    /// Order: (a) the binder's remap, (b) the exact qualified entry,
    /// (c) the same-name core-table fallback. Anything else is a fatal
    /// resolution failure, never a dynamic load.
    pub fn resolve(
        &self,
        name: &str,
        library: Option<&str>,
        binder: Option<&dyn Binder>,
    ) -> Result<Arc<ClassSchema>> {
        let (name, library) = match binder.and_then(|b| b.bind(name, library)) {
            Some((bound_name, bound_library)) => (bound_name, bound_library),
            None => (name.to_string(), library.map(str::to_string)),
        };

        // The memo table is keyed by the post-binder name: a binder is
        // per-operation state and its remaps must not leak into later
        // operations on the shared registry.
        let cache_key = match &library {
            Some(lib) => format!("{lib}!{name}"),
            None => name.clone(),
        };
        if let Some(hit) = self
            .resolve_cache
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(&cache_key)
        {
            return Ok(Arc::clone(hit));
        }

        let resolved = self
            .lookup(&name, library.as_deref())
            .ok_or_else(|| {
                KnotcodeError::TypeResolution(match &library {
                    Some(lib) => format!("type `{name}` from module `{lib}` is not registered"),
                    None => format!("core type `{name}` is not registered"),
                })
            })?;

        self.resolve_cache
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
            .entry(cache_key)
            .or_insert_with(|| Arc::clone(&resolved));
        Ok(resolved)
    }

    fn lookup(&self, name: &str, library: Option<&str>) -> Option<Arc<ClassSchema>> {
        if let Some(lib) = library {
            let hit = self
                .qualified
                .read()
                .unwrap_or_else(|poison| poison.into_inner())
                .get(&(name.to_string(), lib.to_string()))
                .cloned();
            if hit.is_some() {
                return hit;
            }
        }
        // Same-name fallback across the default/core module.
        self.core
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
            .get(name)
            .cloned()
    }
}

impl TypeSchemaProvider for TypeRegistry {
    fn class_schema(&self, name: &str, library: Option<&str>) -> Option<Arc<ClassSchema>> {
        self.lookup(name, library)
    }
}
