//! The segment registry – the single source of truth for "is this segment
//! publishable".
//!
//! One entry per `(subject, segment)` pair, created on first observation and
//! kept for the life of the process.  Two threads of control touch the map:
//! the polling loop (reader, [`try_lookup_or_insert`]
//! [SegmentRegistry::try_lookup_or_insert] with a non-blocking lock attempt)
//! and registrar tasks (writers, which finish construction on the shared
//! slot without re-taking the map lock).
//!
//! # Two-phase registration protocol
//!
//! 1. The polling tick that first observes an unknown key inserts a
//!    placeholder slot *while still holding the map lock*.  Every later tick
//!    therefore sees "present, not ready" and cannot trigger a second
//!    registration.
//! 2. The registrar task builds the output channels off the hot path, stores
//!    them on the slot, and flips `ready` last.  Only the registrar that owns
//!    a key ever promotes it, so the flip needs no lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use mocap_middleware::LifecyclePublisher;
use mocap_types::Transform3D;

/// Output channels plus calibration for one fully registered segment.
#[derive(Debug)]
pub struct SegmentPublication {
    /// Rigid correction composed with the raw pose before publication.
    /// Identity until a calibration source is wired in.
    pub calibration: Transform3D,
    pub pose: LifecyclePublisher,
    pub odom: LifecyclePublisher,
}

/// Registry slot for one segment.
///
/// `ready == true` implies `publication` is set; the registrar stores the
/// publication before flipping the flag (release ordering), and readers
/// check the flag first (acquire ordering).
#[derive(Debug, Default)]
pub struct SegmentSlot {
    ready: AtomicBool,
    publication: OnceLock<SegmentPublication>,
}

impl SegmentSlot {
    /// Whether the slot may be published to.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// The finished publication, if construction has completed.
    pub fn publication(&self) -> Option<&SegmentPublication> {
        self.publication.get()
    }

    /// Store the finished publication and promote the slot.
    ///
    /// Called exactly once, by the registrar task that inserted the slot.
    /// A second call indicates a protocol violation and is ignored.
    pub fn promote(&self, publication: SegmentPublication) -> bool {
        let stored = self.publication.set(publication).is_ok();
        if stored {
            self.ready.store(true, Ordering::Release);
        }
        stored
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

/// Outcome of a polling-thread lookup.
#[derive(Debug)]
pub enum RegistryLookup {
    /// The map lock was held elsewhere; try again next frame.
    Contended,
    /// The key was unknown; a placeholder has been inserted under the lock
    /// and the caller must hand the slot to the registrar.
    Inserted(Arc<SegmentSlot>),
    /// The key exists but channel construction has not finished.
    NotReady,
    /// The key is fully registered and publishable.
    Ready(Arc<SegmentSlot>),
}

/// Concurrently accessed map from segment key to publication state.
#[derive(Debug, Default)]
pub struct SegmentRegistry {
    slots: Mutex<HashMap<String, Arc<SegmentSlot>>>,
}

/// Registry key for a `(subject, segment)` pair.
pub fn segment_key(subject_name: &str, segment_name: &str) -> String {
    format!("{subject_name}/{segment_name}")
}

impl SegmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup used by the polling loop.
    ///
    /// Never waits on the lock: contention is reported to the caller, which
    /// simply retries on the next frame.  An unknown key is replaced by a
    /// placeholder before the lock is released, which is what makes duplicate
    /// registration impossible.
    pub fn try_lookup_or_insert(&self, subject_name: &str, segment_name: &str) -> RegistryLookup {
        let Ok(mut slots) = self.slots.try_lock() else {
            return RegistryLookup::Contended;
        };
        let key = segment_key(subject_name, segment_name);
        match slots.get(&key) {
            Some(slot) if slot.is_ready() => RegistryLookup::Ready(Arc::clone(slot)),
            Some(_) => RegistryLookup::NotReady,
            None => {
                let slot = Arc::new(SegmentSlot::default());
                slots.insert(key, Arc::clone(&slot));
                RegistryLookup::Inserted(slot)
            }
        }
    }

    /// Fetch a slot by key, waiting for the lock.  Lifecycle/test path, not
    /// called from the polling loop.
    pub fn get(&self, subject_name: &str, segment_name: &str) -> Option<Arc<SegmentSlot>> {
        let slots = self.slots.lock().expect("registry lock poisoned");
        slots.get(&segment_key(subject_name, segment_name)).cloned()
    }

    /// Number of registered keys, placeholders included.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark every fully constructed entry ready and activate its channels.
    ///
    /// Placeholders still under construction are left alone; their registrar
    /// task finishes them.
    pub fn activate_all(&self) {
        let slots = self.slots.lock().expect("registry lock poisoned");
        for slot in slots.values() {
            if let Some(publication) = slot.publication() {
                publication.pose.activate();
                publication.odom.activate();
                slot.set_ready(true);
            }
        }
    }

    /// Mark every entry not ready and deactivate constructed channels.
    pub fn deactivate_all(&self) {
        let slots = self.slots.lock().expect("registry lock poisoned");
        for slot in slots.values() {
            if let Some(publication) = slot.publication() {
                publication.pose.deactivate();
                publication.odom.deactivate();
            }
            slot.set_ready(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocap_middleware::{OutboundBus, QosProfile};

    fn make_publication(bus: &OutboundBus, topic: &str) -> SegmentPublication {
        SegmentPublication {
            calibration: Transform3D::identity(),
            pose: bus.create_publisher(topic.to_string(), QosProfile::sensor_data()),
            odom: bus.create_publisher(format!("{topic}_odom"), QosProfile::sensor_data()),
        }
    }

    #[test]
    fn unknown_key_inserts_placeholder() {
        let registry = SegmentRegistry::new();
        match registry.try_lookup_or_insert("drone1", "base") {
            RegistryLookup::Inserted(slot) => assert!(!slot.is_ready()),
            other => panic!("expected Inserted, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);

        // The placeholder is immediately visible as present-but-not-ready.
        assert!(matches!(
            registry.try_lookup_or_insert("drone1", "base"),
            RegistryLookup::NotReady
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn promote_makes_slot_ready() {
        let registry = SegmentRegistry::new();
        let bus = OutboundBus::new();
        let RegistryLookup::Inserted(slot) = registry.try_lookup_or_insert("drone1", "base")
        else {
            panic!("expected Inserted");
        };

        assert!(slot.promote(make_publication(&bus, "mocap/drone1/base")));
        assert!(matches!(
            registry.try_lookup_or_insert("drone1", "base"),
            RegistryLookup::Ready(_)
        ));
    }

    #[test]
    fn double_promote_is_rejected() {
        let bus = OutboundBus::new();
        let slot = SegmentSlot::default();
        assert!(slot.promote(make_publication(&bus, "a")));
        assert!(!slot.promote(make_publication(&bus, "b")));
        assert!(slot.is_ready());
    }

    #[test]
    fn contended_lock_reports_contention() {
        let registry = SegmentRegistry::new();
        let _guard = registry.slots.lock().unwrap();
        assert!(matches!(
            registry.try_lookup_or_insert("drone1", "base"),
            RegistryLookup::Contended
        ));
    }

    #[test]
    fn entries_are_independent() {
        let registry = SegmentRegistry::new();
        let bus = OutboundBus::new();
        let RegistryLookup::Inserted(base) = registry.try_lookup_or_insert("drone1", "base")
        else {
            panic!("expected Inserted");
        };
        let RegistryLookup::Inserted(_rotor) = registry.try_lookup_or_insert("drone1", "rotor")
        else {
            panic!("expected Inserted");
        };

        base.promote(make_publication(&bus, "mocap/drone1/base"));

        // One ready, one still a placeholder, under the same subject.
        assert!(matches!(
            registry.try_lookup_or_insert("drone1", "base"),
            RegistryLookup::Ready(_)
        ));
        assert!(matches!(
            registry.try_lookup_or_insert("drone1", "rotor"),
            RegistryLookup::NotReady
        ));
    }

    #[test]
    fn deactivate_then_activate_roundtrip() {
        let registry = SegmentRegistry::new();
        let bus = OutboundBus::new();
        let RegistryLookup::Inserted(slot) = registry.try_lookup_or_insert("drone1", "base")
        else {
            panic!("expected Inserted");
        };
        slot.promote(make_publication(&bus, "mocap/drone1/base"));

        registry.deactivate_all();
        assert!(!slot.is_ready());
        assert!(!slot.publication().unwrap().pose.is_activated());

        registry.activate_all();
        assert!(slot.is_ready());
        assert!(slot.publication().unwrap().pose.is_activated());
    }

    #[test]
    fn activate_all_skips_placeholders() {
        let registry = SegmentRegistry::new();
        let RegistryLookup::Inserted(slot) = registry.try_lookup_or_insert("drone1", "base")
        else {
            panic!("expected Inserted");
        };
        registry.activate_all();
        // A placeholder has no channels, so it must not be promoted here.
        assert!(!slot.is_ready());
    }
}
