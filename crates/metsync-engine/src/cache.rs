//! Partial-state caches for the two inbound streams.
//!
//! Both caches hold owned samples and only ever grow: a new arrival
//! replaces the entry for its key, nothing is evicted.

use std::collections::HashMap;

use tracing::trace;

use metsync_core::{Sample, TAG_VM};

use crate::error::CorrelationError;

/// Latest volume-origin sample per volume identifier.
#[derive(Debug, Default)]
pub struct VolumeCache {
    entries: HashMap<String, Sample>,
    capacity: Option<usize>,
}

impl VolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of distinct volume keys.
    pub fn with_capacity_limit(mut self, limit: Option<usize>) -> Self {
        self.capacity = limit;
        self
    }

    /// Store `sample` under `image`, replacing any previous entry.
    pub fn insert(&mut self, image: &str, sample: Sample) -> Result<(), CorrelationError> {
        if !self.entries.contains_key(image) && at_capacity(self.entries.len(), self.capacity) {
            return Err(CorrelationError::CacheFull {
                key: image.to_string(),
            });
        }
        trace!(%image, fields = sample.len(), "volume cached");
        self.entries.insert(image.to_string(), sample);
        Ok(())
    }

    pub fn get(&self, image: &str) -> Option<&Sample> {
        self.entries.get(image)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Latest VM-origin sample per VM, indexed by the volumes it claims.
///
/// One owned record is kept per VM identity. The `owners` index maps
/// every volume identifier ever listed to the VM that listed it last;
/// an entry only resolves while that VM's latest record still lists the
/// volume.
#[derive(Debug, Default)]
pub struct VmCache {
    records: HashMap<String, Sample>,
    owners: HashMap<String, String>,
    capacity: Option<usize>,
}

impl VmCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of distinct VM identities.
    pub fn with_capacity_limit(mut self, limit: Option<usize>) -> Self {
        self.capacity = limit;
        self
    }

    /// Store the record for `vm` and point each listed volume at it.
    pub fn insert(&mut self, vm: &str, sample: Sample) -> Result<(), CorrelationError> {
        if !self.records.contains_key(vm) && at_capacity(self.records.len(), self.capacity) {
            return Err(CorrelationError::CacheFull { key: vm.to_string() });
        }

        for volume in sample.volume_ids() {
            self.owners.insert(volume.to_string(), vm.to_string());
        }
        trace!(%vm, volumes = ?sample.volume_ids(), "vm cached");
        self.records.insert(vm.to_string(), sample);
        Ok(())
    }

    /// The most recent record of the VM that last claimed `volume`.
    ///
    /// `None` once that VM re-arrived without listing `volume`.
    pub fn owner_of(&self, volume: &str) -> Option<&Sample> {
        let vm = self.owners.get(volume)?;
        self.records
            .get(vm)
            .filter(|record| record.volume_ids().iter().any(|id| *id == volume))
    }

    /// Identity of the VM currently claiming `volume`.
    pub fn owner_id(&self, volume: &str) -> Option<&str> {
        self.owner_of(volume)?.tag(TAG_VM)
    }

    pub fn get(&self, vm: &str) -> Option<&Sample> {
        self.records.get(vm)
    }

    /// Number of VM identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of indexed volume identifiers.
    pub fn claimed_volumes(&self) -> usize {
        self.owners.len()
    }
}

fn at_capacity(len: usize, capacity: Option<usize>) -> bool {
    capacity.is_some_and(|cap| len >= cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use metsync_core::{TAG_IMAGE, TAG_VOLUMES};

    fn volume(image: &str, field: &str, value: f64) -> Sample {
        Sample::new(DateTime::from_timestamp(1, 0).unwrap(), vec![field.into()], vec![value])
            .unwrap()
            .with_tag(TAG_IMAGE, image)
    }

    fn vm(id: &str, volumes: &str) -> Sample {
        Sample::new(DateTime::from_timestamp(1, 0).unwrap(), vec!["cpu".into()], vec![0.5])
            .unwrap()
            .with_tag(TAG_VM, id)
            .with_tag(TAG_VOLUMES, volumes)
    }

    #[test]
    fn volume_last_write_wins() {
        let mut cache = VolumeCache::new();
        cache.insert("v1", volume("v1", "reads", 1.0)).unwrap();
        cache.insert("v1", volume("v1", "reads", 2.0)).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("v1").unwrap().field("reads"), Some(2.0));
    }

    #[test]
    fn volume_replay_is_idempotent() {
        let mut once = VolumeCache::new();
        let mut twice = VolumeCache::new();
        let sample = volume("v1", "reads", 5.0);

        once.insert("v1", sample.clone()).unwrap();
        twice.insert("v1", sample.clone()).unwrap();
        twice.insert("v1", sample).unwrap();

        assert_eq!(once.get("v1"), twice.get("v1"));
    }

    #[test]
    fn vm_fans_out_to_every_volume() {
        let mut cache = VmCache::new();
        let record = vm("vm1", "A|B");
        cache.insert("vm1", record.clone()).unwrap();

        assert_eq!(cache.owner_of("A"), Some(&record));
        assert_eq!(cache.owner_of("B"), Some(&record));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.claimed_volumes(), 2);
    }

    #[test]
    fn later_claim_does_not_touch_other_volumes() {
        let mut cache = VmCache::new();
        let first = vm("vm1", "A|B");
        cache.insert("vm1", first.clone()).unwrap();
        cache.insert("vm2", vm("vm2", "A")).unwrap();

        assert_eq!(cache.owner_id("A"), Some("vm2"));
        assert_eq!(cache.owner_of("B"), Some(&first));
    }

    #[test]
    fn dropped_volume_stops_resolving_to_same_vm() {
        let mut cache = VmCache::new();
        cache.insert("vm1", vm("vm1", "A|B")).unwrap();
        let narrowed = vm("vm1", "A");
        cache.insert("vm1", narrowed.clone()).unwrap();

        assert_eq!(cache.owner_of("A"), Some(&narrowed));
        assert!(cache.owner_of("B").is_none());
        assert!(cache.owner_id("B").is_none());
        // The index entry is kept; B resolves again once re-listed.
        assert_eq!(cache.claimed_volumes(), 2);
        let widened = vm("vm1", "A|B");
        cache.insert("vm1", widened.clone()).unwrap();
        assert_eq!(cache.owner_of("B"), Some(&widened));
    }

    #[test]
    fn missing_volumes_tag_claims_empty_id() {
        let mut cache = VmCache::new();
        let record = Sample::empty().with_tag(TAG_VM, "vm1");
        cache.insert("vm1", record).unwrap();
        assert_eq!(cache.owner_id(""), Some("vm1"));
    }

    #[test]
    fn capacity_refuses_new_keys_only() {
        let mut cache = VolumeCache::new().with_capacity_limit(Some(1));
        cache.insert("v1", volume("v1", "reads", 1.0)).unwrap();

        let err = cache.insert("v2", volume("v2", "reads", 1.0)).unwrap_err();
        assert_eq!(err, CorrelationError::CacheFull { key: "v2".into() });

        // Existing keys are still replaced.
        cache.insert("v1", volume("v1", "reads", 3.0)).unwrap();
        assert_eq!(cache.get("v1").unwrap().field("reads"), Some(3.0));
    }

    #[test]
    fn vm_capacity_counts_identities() {
        let mut cache = VmCache::new().with_capacity_limit(Some(1));
        cache.insert("vm1", vm("vm1", "A|B|C")).unwrap();
        assert!(cache.insert("vm2", vm("vm2", "D")).is_err());
        assert!(cache.owner_of("D").is_none());
        cache.insert("vm1", vm("vm1", "A")).unwrap();
    }
}
