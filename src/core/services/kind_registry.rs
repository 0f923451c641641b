use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::core::errors::{Result, TrailError};
use crate::core::models::entity_ref::{EntityId, EntityKind, EntityRef};
use crate::core::traits::entity::{Entity, EntityLookup};

type AnyEntity = Arc<dyn Any + Send + Sync>;
type ErasedLookup = Arc<dyn Fn(&EntityId) -> Result<Option<AnyEntity>> + Send + Sync>;

/// A live entity found behind a reference, type-erased.
#[derive(Clone)]
pub struct ResolvedEntity {
    reference: EntityRef,
    value: AnyEntity,
}

impl ResolvedEntity {
    pub fn reference(&self) -> &EntityRef {
        &self.reference
    }

    /// Borrow the entity as `E`, or `None` if it is of another type.
    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.value.downcast_ref::<E>()
    }
}

impl fmt::Debug for ResolvedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEntity")
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

struct KindInfo {
    type_name: Option<&'static str>,
    lookup: Option<ErasedLookup>,
}

/// Maps entity types to stable kinds and kinds back to lookups.
///
/// Populated once at startup and handed to the `Trail`. Only consulted to
/// encode entities into references and to resolve references back.
#[derive(Default)]
pub struct KindRegistry {
    kinds: BTreeMap<EntityKind, KindInfo>,
    by_type: HashMap<TypeId, EntityKind>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the Rust type `E` under `kind`, resolvable through `lookup`.
    ///
    /// # Errors
    ///
    /// - `KindConflict` if the kind is taken or `E` already has a kind.
    pub fn register<E, L>(&mut self, kind: impl Into<EntityKind>, lookup: L) -> Result<()>
    where
        E: Entity,
        L: EntityLookup<E> + 'static,
    {
        let kind = kind.into();
        let type_name = std::any::type_name::<E>();

        if let Some(existing) = self.by_type.get(&TypeId::of::<E>()) {
            return Err(TrailError::KindConflict {
                detail: format!("type {type_name} is already registered as '{existing}'"),
            });
        }
        self.ensure_kind_free(&kind)?;

        let erased: ErasedLookup = Arc::new(move |id: &EntityId| -> Result<Option<AnyEntity>> {
            Ok(lookup
                .find(id)?
                .map(|entity| Arc::new(entity) as AnyEntity))
        });

        self.by_type.insert(TypeId::of::<E>(), kind.clone());
        self.kinds.insert(
            kind,
            KindInfo {
                type_name: Some(type_name),
                lookup: Some(erased),
            },
        );
        Ok(())
    }

    /// Register a bare kind with no Rust type behind it. References of this
    /// kind can be stored and queried but never resolve.
    ///
    /// Registering the same bare kind twice is a no-op.
    pub fn register_kind(&mut self, kind: impl Into<EntityKind>) -> Result<()> {
        let kind = kind.into();
        if let Some(info) = self.kinds.get(&kind)
            && info.type_name.is_none()
        {
            return Ok(());
        }
        self.ensure_kind_free(&kind)?;

        self.kinds.insert(
            kind,
            KindInfo {
                type_name: None,
                lookup: None,
            },
        );
        Ok(())
    }

    fn ensure_kind_free(&self, kind: &EntityKind) -> Result<()> {
        match self.kinds.get(kind) {
            Some(info) => Err(TrailError::KindConflict {
                detail: format!(
                    "kind '{kind}' is already registered{}",
                    info.type_name
                        .map(|t| format!(" for {t}"))
                        .unwrap_or_default()
                ),
            }),
            None => Ok(()),
        }
    }

    pub fn is_registered(&self, kind: &EntityKind) -> bool {
        self.kinds.contains_key(kind)
    }

    /// All registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.kinds.keys()
    }

    /// Kind registered for the Rust type `E`, if any.
    pub fn kind_of<E: Entity>(&self) -> Option<&EntityKind> {
        self.by_type.get(&TypeId::of::<E>())
    }

    /// Canonical reference for a live entity.
    pub fn reference_for<E: Entity>(&self, entity: &E) -> Result<EntityRef> {
        let kind = self
            .kind_of::<E>()
            .ok_or(TrailError::UnregisteredType {
                type_name: std::any::type_name::<E>(),
            })?;
        Ok(EntityRef {
            kind: kind.clone(),
            id: entity.entity_id(),
        })
    }

    /// Build a reference from a raw `(kind, id)` pair of a registered kind.
    pub fn reference(
        &self,
        kind: impl Into<EntityKind>,
        id: impl Into<EntityId>,
    ) -> Result<EntityRef> {
        let reference = EntityRef::new(kind, id);
        self.check(&reference)?;
        Ok(reference)
    }

    /// Fail with `UnregisteredKind` unless the reference's kind is known.
    pub fn check(&self, reference: &EntityRef) -> Result<()> {
        if self.is_registered(&reference.kind) {
            Ok(())
        } else {
            Err(TrailError::UnregisteredKind {
                kind: reference.kind.to_string(),
            })
        }
    }

    /// Resolve a reference to its live entity.
    ///
    /// `None` for unknown kinds, bare kinds and ids whose entity is gone.
    /// Errors only come from the lookup itself.
    pub fn resolve(&self, reference: &EntityRef) -> Result<Option<ResolvedEntity>> {
        let Some(lookup) = self
            .kinds
            .get(&reference.kind)
            .and_then(|info| info.lookup.as_ref())
        else {
            return Ok(None);
        };

        Ok(lookup(&reference.id)?.map(|value| ResolvedEntity {
            reference: reference.clone(),
            value,
        }))
    }

    /// Resolve and downcast; `None` also when the entity is not an `E`.
    pub fn resolve_as<E: Entity + Clone>(&self, reference: &EntityRef) -> Result<Option<E>> {
        Ok(self
            .resolve(reference)?
            .and_then(|resolved| resolved.downcast_ref::<E>().cloned()))
    }
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds.keys().collect::<Vec<_>>())
            .finish()
    }
}
