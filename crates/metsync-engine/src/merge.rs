//! Composite construction.
//!
//! A composite starts as a copy of the owning VM's record and is then
//! extended with every owned volume's fields and tags, each renamed to
//! `ceph/<volume>/<name>`.

use metsync_core::Sample;

use crate::cache::{VmCache, VolumeCache};
use crate::error::{CorrelationError, MergeFailure};

/// Prefix of every name folded in from a volume sample.
pub const NAMESPACE_ROOT: &str = "ceph";

/// `ceph/<volume>/<name>`.
pub fn namespaced(volume: &str, name: &str) -> String {
    format!("{NAMESPACE_ROOT}/{volume}/{name}")
}

/// Inverse of [`namespaced`]: the original name if `name` belongs to `volume`.
pub fn strip_namespace<'a>(volume: &str, name: &'a str) -> Option<&'a str> {
    name.strip_prefix(NAMESPACE_ROOT)?
        .strip_prefix('/')?
        .strip_prefix(volume)?
        .strip_prefix('/')
}

/// Fold the cached metrics of `volume` into `composite`.
///
/// Fails without touching `composite` when the volume has no cached
/// sample or the cached sample carries no values.
pub fn append_volume(
    composite: &mut Sample,
    volumes: &VolumeCache,
    volume: &str,
) -> Result<(), CorrelationError> {
    let cached = volumes
        .get(volume)
        .filter(|sample| !sample.values().is_empty())
        .ok_or_else(|| CorrelationError::VolumeMetricsUnknown {
            volume: volume.to_string(),
        })?;

    for (field, value) in cached.iter_fields() {
        composite.push_field(namespaced(volume, field), value);
    }
    for (key, value) in cached.tags() {
        composite.set_tag(namespaced(volume, key), value.clone());
    }
    Ok(())
}

/// Build the composite for the VM that owns `probe`.
///
/// Volumes are folded in the order the VM lists them. The first volume
/// without metrics aborts the attempt; the failure carries the partially
/// built composite.
pub fn compose(vms: &VmCache, volumes: &VolumeCache, probe: &str) -> Result<Sample, MergeFailure> {
    let base = vms.owner_of(probe).ok_or_else(|| {
        MergeFailure::empty(CorrelationError::NoOwningVm {
            volume: probe.to_string(),
        })
    })?;

    let mut composite = base.clone();
    for volume in base.volume_ids() {
        if let Err(error) = append_volume(&mut composite, volumes, volume) {
            return Err(MergeFailure {
                error,
                partial: composite,
            });
        }
    }
    Ok(composite)
}
