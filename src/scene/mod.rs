//! Scene management
//!
//! A small entity registry on top of a bevy_ecs world. Entities carry a name
//! and optionally a [`Transform`].

mod transform;

pub use transform::*;

use bevy_ecs::prelude::*;

/// Human-readable name of an entity
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct EntityName(pub String);

/// The scene containing all entities
pub struct Scene {
    world: World,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
        }
    }

    /// Spawn an entity with just a name
    pub fn create_entity(&mut self, name: &str) -> Entity {
        let entity = self.world.spawn(EntityName(name.to_string())).id();
        log::debug!("Created entity '{}' ({:?})", name, entity);
        entity
    }

    pub fn create_entity_with_transform(&mut self, name: &str, transform: Transform) -> Entity {
        let entity = self
            .world
            .spawn((EntityName(name.to_string()), transform))
            .id();
        log::debug!("Created entity '{}' ({:?}) at {}", name, entity, transform.position);
        entity
    }

    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.world
            .get::<EntityName>(entity)
            .map(|name| name.0.as_str())
    }

    pub fn transform(&self, entity: Entity) -> Option<&Transform> {
        self.world.get::<Transform>(entity)
    }

    pub fn transform_mut(&mut self, entity: Entity) -> Option<Mut<'_, Transform>> {
        self.world.get_mut::<Transform>(entity)
    }

    /// First entity with the given name
    pub fn find_by_name(&mut self, name: &str) -> Option<Entity> {
        let mut query = self.world.query::<(Entity, &EntityName)>();
        query
            .iter(&self.world)
            .find(|(_, entity_name)| entity_name.0 == name)
            .map(|(entity, _)| entity)
    }

    pub fn entity_count(&self) -> usize {
        self.world.entities().len() as usize
    }

    /// Remove an entity, returning whether it existed
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn entities_are_found_by_name() {
        let mut scene = Scene::new();
        let frog = scene.create_entity("Frog");
        let toad = scene.create_entity_with_transform("Toad", Transform::from_position(Vec3::X));

        assert_eq!(scene.entity_count(), 2);
        assert_eq!(scene.find_by_name("Frog"), Some(frog));
        assert_eq!(scene.find_by_name("Toad"), Some(toad));
        assert_eq!(scene.find_by_name("Newt"), None);
        assert_eq!(scene.name(frog), Some("Frog"));
        assert!(scene.transform(frog).is_none());
        assert_eq!(scene.transform(toad).map(|t| t.position), Some(Vec3::X));
    }

    #[test]
    fn despawn_removes_entity() {
        let mut scene = Scene::new();
        let frog = scene.create_entity("Frog");
        assert!(scene.despawn(frog));
        assert!(!scene.despawn(frog));
        assert_eq!(scene.entity_count(), 0);
        assert_eq!(scene.name(frog), None);
    }

    #[test]
    fn transform_can_be_edited() {
        let mut scene = Scene::new();
        let entity = scene.create_entity_with_transform("Frog", Transform::default());
        if let Some(mut transform) = scene.transform_mut(entity) {
            transform.position = Vec3::new(0.0, 1.0, 0.0);
        }
        assert_eq!(scene.transform(entity).map(|t| t.position.y), Some(1.0));
    }
}
