//! Instance id allocation.

use std::collections::HashMap;
use std::hash::Hash;

/// Arena handle of an object inside one accessory.
///
/// Services and characteristics are never removed from their accessory, so
/// indices stay valid for the accessory's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    Service(usize),
    Characteristic { service: usize, index: usize },
}

/// Bidirectional map between objects and sequential instance ids.
///
/// The counter is pre-incremented, so the first id handed out is 1.
#[derive(Debug, Clone)]
pub struct IidManager<K: Copy + Eq + Hash = ObjectId> {
    counter: u64,
    iids: HashMap<K, u64>,
    objects: HashMap<u64, K>,
}

impl<K: Copy + Eq + Hash> Default for IidManager<K> {
    fn default() -> Self {
        Self {
            counter: 0,
            iids: HashMap::new(),
            objects: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> IidManager<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id to `object`. Known objects keep their id.
    pub fn assign(&mut self, object: K) -> u64 {
        if let Some(iid) = self.iids.get(&object) {
            return *iid;
        }

        self.counter += 1;
        self.iids.insert(object, self.counter);
        self.objects.insert(self.counter, object);
        self.counter
    }

    pub fn get_iid(&self, object: &K) -> Option<u64> {
        self.iids.get(object).copied()
    }

    pub fn get_object(&self, iid: u64) -> Option<K> {
        self.objects.get(&iid).copied()
    }

    /// Forget an object. Returns its id, or None if it was not known.
    pub fn remove_object(&mut self, object: &K) -> Option<u64> {
        let iid = self.iids.remove(object)?;
        self.objects.remove(&iid);
        Some(iid)
    }

    /// Forget an id. Returns its object, or None if it was not known.
    pub fn remove_iid(&mut self, iid: u64) -> Option<K> {
        let object = self.objects.remove(&iid)?;
        self.iids.remove(&object);
        Some(object)
    }

    pub fn len(&self) -> usize {
        self.iids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_in_call_order() {
        let mut iids = IidManager::new();
        assert_eq!(iids.assign(ObjectId::Service(0)), 1);
        assert_eq!(iids.assign(ObjectId::Characteristic { service: 0, index: 0 }), 2);
        assert_eq!(iids.assign(ObjectId::Service(1)), 3);
    }

    #[test]
    fn double_assign_keeps_original_id() {
        let mut iids = IidManager::new();
        let first = iids.assign(ObjectId::Service(4));
        iids.assign(ObjectId::Service(5));
        assert_eq!(iids.assign(ObjectId::Service(4)), first);
        assert_eq!(iids.len(), 2);
    }

    #[test]
    fn lookup_both_directions() {
        let mut iids = IidManager::new();
        let object = ObjectId::Characteristic { service: 1, index: 2 };
        let iid = iids.assign(object);

        assert_eq!(iids.get_iid(&object), Some(iid));
        assert_eq!(iids.get_object(iid), Some(object));
        assert_eq!(iids.get_object(99), None);
    }

    #[test]
    fn remove_object_is_idempotent() {
        let mut iids = IidManager::new();
        let object = ObjectId::Service(0);
        let iid = iids.assign(object);

        assert_eq!(iids.remove_object(&object), Some(iid));
        assert_eq!(iids.remove_object(&object), None);
        assert_eq!(iids.get_object(iid), None);
    }

    #[test]
    fn remove_iid_is_idempotent() {
        let mut iids = IidManager::new();
        let object = ObjectId::Service(0);
        let iid = iids.assign(object);

        assert_eq!(iids.remove_iid(iid), Some(object));
        assert_eq!(iids.remove_iid(iid), None);
        assert!(iids.is_empty());
    }

    #[test]
    fn removed_ids_are_not_reused() {
        let mut iids: IidManager<u32> = IidManager::new();
        iids.assign(10);
        iids.remove_object(&10);
        assert_eq!(iids.assign(10), 2);
    }
}
