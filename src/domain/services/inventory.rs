//! Inventory - putting entities inside containers
//!
//! Stackable items of the same kind collapse into the stack already held: the
//! existing entity's quantity grows and the existing entity becomes the item
//! of record. Callers must use the returned key and drop the merged item.

use crate::domain::entities::{Container, Entity, Located, Stackable};
use crate::domain::value_objects::EntityKey;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InventoryError {
    #[error("Entity {0} cannot hold other entities")]
    NotAContainer(EntityKey),

    #[error("Container {0} is full")]
    ContainerFull(EntityKey),

    #[error("Entity {0} cannot hold itself")]
    SelfContainment(EntityKey),
}

/// Add `item` to `holder`.
///
/// `held` must yield the entities currently listed in the holder's
/// `Container`. Returns the key of the item of record: a pre-existing stack
/// when the item merged into one, otherwise the item's own key.
pub fn hold<'a>(
    holder: &mut Entity,
    item: &mut Entity,
    held: impl IntoIterator<Item = &'a mut Entity>,
) -> Result<EntityKey, InventoryError> {
    if holder.key() == item.key() {
        return Err(InventoryError::SelfContainment(holder.key().clone()));
    }
    if !holder.is_applicable::<Container>() {
        return Err(InventoryError::NotAContainer(holder.key().clone()));
    }

    if item.has::<Stackable>() {
        let incoming = item.read::<Stackable>();
        if !incoming.kind.is_empty() {
            for existing in held {
                if existing.key() == item.key()
                    || !existing.has::<Stackable>()
                    || existing.read::<Stackable>().kind != incoming.kind
                {
                    continue;
                }
                if let Some(mut stack) = existing.make::<Stackable>() {
                    stack.quantity = stack.quantity.saturating_add(incoming.quantity);
                }
                tracing::debug!(
                    stack = %existing.key(),
                    merged = %item.key(),
                    kind = %incoming.kind,
                    "Merged item into existing stack"
                );
                return Ok(existing.key().clone());
            }
        }
    }

    let current = holder.read::<Container>();
    if current.contains(item.key()) {
        return Ok(item.key().clone());
    }
    if current.is_full() {
        return Err(InventoryError::ContainerFull(holder.key().clone()));
    }

    let holder_key = holder.key().clone();
    if let Some(mut container) = holder.make::<Container>() {
        container.contents.push(item.key().clone());
    }
    if let Some(mut located) = item.make::<Located>() {
        located.location = Some(holder_key);
    }

    Ok(item.key().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Describable, ScopeRegistry};

    fn apples(registry: &ScopeRegistry, quantity: u32) -> Entity {
        let mut entity = Entity::new(registry, "item").unwrap();
        if let Some(mut stack) = entity.make::<Stackable>() {
            stack.kind = "apple".to_string();
            stack.quantity = quantity;
        }
        entity
    }

    #[test]
    fn test_hold_inserts_and_locates() {
        let registry = ScopeRegistry::default();
        let mut player = Entity::new(&registry, "player").unwrap();
        let mut sword = Entity::new(&registry, "item").unwrap();
        if let Some(mut desc) = sword.make::<Describable>() {
            desc.name = "sword".to_string();
        }

        let of_record = hold(&mut player, &mut sword, std::iter::empty()).unwrap();

        assert_eq!(&of_record, sword.key());
        assert!(player.read::<Container>().contains(sword.key()));
        assert_eq!(sword.read::<Located>().location.as_ref(), Some(player.key()));
    }

    #[test]
    fn test_hold_merges_into_existing_stack() {
        let registry = ScopeRegistry::default();
        let mut player = Entity::new(&registry, "player").unwrap();
        let mut first = apples(&registry, 2);
        hold(&mut player, &mut first, std::iter::empty()).unwrap();

        let mut second = apples(&registry, 3);
        let of_record = hold(&mut player, &mut second, [&mut first]).unwrap();

        assert_eq!(&of_record, first.key());
        assert_eq!(first.read::<Stackable>().quantity, 5);
        assert_eq!(player.read::<Container>().contents.len(), 1);
        assert!(!player.read::<Container>().contains(second.key()));
    }

    #[test]
    fn test_hold_different_kinds_do_not_merge() {
        let registry = ScopeRegistry::default();
        let mut player = Entity::new(&registry, "player").unwrap();
        let mut first = apples(&registry, 1);
        hold(&mut player, &mut first, std::iter::empty()).unwrap();

        let mut pear = Entity::new(&registry, "item").unwrap();
        if let Some(mut stack) = pear.make::<Stackable>() {
            stack.kind = "pear".to_string();
        }
        let of_record = hold(&mut player, &mut pear, [&mut first]).unwrap();

        assert_eq!(&of_record, pear.key());
        assert_eq!(first.read::<Stackable>().quantity, 1);
        assert_eq!(player.read::<Container>().contents.len(), 2);
    }

    #[test]
    fn test_hold_rejects_non_container_and_full() {
        let registry = ScopeRegistry::default();
        let mut rock = Entity::new(&registry, "item").unwrap();
        let mut pebble = Entity::new(&registry, "item").unwrap();
        assert_eq!(
            hold(&mut rock, &mut pebble, std::iter::empty()),
            Err(InventoryError::NotAContainer(rock.key().clone()))
        );

        let mut pouch = Entity::new(&registry, "container").unwrap();
        if let Some(mut container) = pouch.make::<Container>() {
            container.capacity = Some(0);
        }
        assert_eq!(
            hold(&mut pouch, &mut pebble, std::iter::empty()),
            Err(InventoryError::ContainerFull(pouch.key().clone()))
        );
    }
}
