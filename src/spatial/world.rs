//! World entity lookup
//!
//! The scene graph is an external collaborator; the tracker only needs to
//! resolve entities by name and read their transform and speed each tick.

use super::Vec3;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Opaque handle of a resolved world entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub u64);

/// World-space pose of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    /// World position.
    pub position: Vec3,
    /// Facing direction.
    pub forward: Vec3,
    /// Up vector.
    pub up: Vec3,
}

impl WorldTransform {
    /// A pose at `position` facing +Z with +Y up.
    pub fn at(position: Vec3) -> Self {
        WorldTransform {
            position,
            forward: Vec3::Z,
            up: Vec3::Y,
        }
    }
}

/// Per-entity capabilities relevant to sound tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityTraits {
    /// Sound originates at a secondary locator (the head) when present.
    pub facing: bool,
    /// Playback pitch follows the entity's speed.
    pub speed_pitch: bool,
}

/// Inbound contract of the scene graph.
pub trait WorldLookup: Send + Sync {
    /// Resolve an entity by name.
    fn resolve_by_name(&self, name: &str) -> Option<EntityHandle>;

    /// Current world pose; `None` once the entity has gone away.
    fn world_transform(&self, entity: EntityHandle) -> Option<WorldTransform>;

    /// Current speed in world units per second.
    fn speed(&self, entity: EntityHandle) -> f32;

    /// Tracking capabilities of the entity.
    fn traits(&self, _entity: EntityHandle) -> EntityTraits {
        EntityTraits::default()
    }

    /// World position of a named locator on the entity.
    fn locator(&self, _entity: EntityHandle, _name: &str) -> Option<Vec3> {
        None
    }
}

#[derive(Debug, Clone)]
struct EntityRecord {
    name: String,
    transform: WorldTransform,
    speed: f32,
    traits: EntityTraits,
    locators: HashMap<String, Vec3>,
}

/// In-memory entity table implementing [`WorldLookup`].
///
/// Used by the demo binary and by tests; a game would implement the trait on
/// its own scene graph.
#[derive(Debug, Default)]
pub struct EntityTable {
    entities: RwLock<Vec<EntityRecord>>,
}

impl EntityTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity and return its handle.
    pub fn insert(&self, name: impl Into<String>, transform: WorldTransform) -> EntityHandle {
        let mut entities = self.entities.write();
        entities.push(EntityRecord {
            name: name.into(),
            transform,
            speed: 0.0,
            traits: EntityTraits::default(),
            locators: HashMap::new(),
        });
        EntityHandle(entities.len() as u64 - 1)
    }

    /// Move an entity.
    pub fn set_position(&self, entity: EntityHandle, position: Vec3) {
        if let Some(record) = self.entities.write().get_mut(entity.0 as usize) {
            record.transform.position = position;
        }
    }

    /// Set an entity's speed.
    pub fn set_speed(&self, entity: EntityHandle, speed: f32) {
        if let Some(record) = self.entities.write().get_mut(entity.0 as usize) {
            record.speed = speed;
        }
    }

    /// Set an entity's tracking capabilities.
    pub fn set_traits(&self, entity: EntityHandle, traits: EntityTraits) {
        if let Some(record) = self.entities.write().get_mut(entity.0 as usize) {
            record.traits = traits;
        }
    }

    /// Attach a named locator in world space.
    pub fn set_locator(&self, entity: EntityHandle, name: impl Into<String>, position: Vec3) {
        if let Some(record) = self.entities.write().get_mut(entity.0 as usize) {
            record.locators.insert(name.into(), position);
        }
    }
}

impl WorldLookup for EntityTable {
    fn resolve_by_name(&self, name: &str) -> Option<EntityHandle> {
        self.entities
            .read()
            .iter()
            .position(|record| record.name.eq_ignore_ascii_case(name))
            .map(|index| EntityHandle(index as u64))
    }

    fn world_transform(&self, entity: EntityHandle) -> Option<WorldTransform> {
        self.entities
            .read()
            .get(entity.0 as usize)
            .map(|record| record.transform)
    }

    fn speed(&self, entity: EntityHandle) -> f32 {
        self.entities
            .read()
            .get(entity.0 as usize)
            .map_or(0.0, |record| record.speed)
    }

    fn traits(&self, entity: EntityHandle) -> EntityTraits {
        self.entities
            .read()
            .get(entity.0 as usize)
            .map_or_else(EntityTraits::default, |record| record.traits)
    }

    fn locator(&self, entity: EntityHandle, name: &str) -> Option<Vec3> {
        self.entities
            .read()
            .get(entity.0 as usize)
            .and_then(|record| record.locators.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_case_insensitive() {
        let table = EntityTable::new();
        let pepper = table.insert("Pepper", WorldTransform::at(Vec3::ZERO));
        assert_eq!(table.resolve_by_name("pepper"), Some(pepper));
        assert_eq!(table.resolve_by_name("mama"), None);
    }

    #[test]
    fn test_updates_visible_through_lookup() {
        let table = EntityTable::new();
        let car = table.insert("car", WorldTransform::at(Vec3::ZERO));
        table.set_position(car, Vec3::new(1.0, 2.0, 3.0));
        table.set_speed(car, 12.0);
        table.set_locator(car, "head", Vec3::new(1.0, 3.0, 3.0));

        assert_eq!(
            table.world_transform(car).unwrap().position,
            Vec3::new(1.0, 2.0, 3.0)
        );
        assert_eq!(table.speed(car), 12.0);
        assert_eq!(table.locator(car, "head"), Some(Vec3::new(1.0, 3.0, 3.0)));
        assert_eq!(table.locator(car, "tail"), None);
    }
}
