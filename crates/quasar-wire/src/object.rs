//! Self-describing runtime objects.
//!
//! Every buffer and message in the runtime carries a stable numeric type
//! identifier and a human-readable name. The identifier is a compile-time
//! constant on the concrete type (`TYPE_ID`), so identity checks on trait
//! objects are plain integer comparisons and survive serialisation: the
//! same identifier is written into frame headers on the wire.
//!
//! Lifetime management is ownership-based. Objects are moved, borrowed or
//! shared behind [`std::sync::Arc`]; there is no manual reference counting
//! and no explicit release call.

/// A runtime object with a stable numeric type identity.
pub trait RttiObject: Send {
    /// Stable numeric identifier of the concrete type.
    ///
    /// By convention this returns the concrete type's associated
    /// `TYPE_ID` constant. Identifiers must be unique within a deployment;
    /// values below 1000 are reserved for the runtime itself.
    fn type_id(&self) -> u32;

    /// Human-readable name of the concrete type, for logs and diagnostics.
    fn type_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked<'a> {
        drops: &'a AtomicUsize,
    }

    impl RttiObject for Tracked<'_> {
        fn type_id(&self) -> u32 {
            4242
        }

        fn type_name(&self) -> &'static str {
            "Tracked"
        }
    }

    impl Drop for Tracked<'_> {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn shared_object_dropped_exactly_once() {
        let drops = AtomicUsize::new(0);

        {
            let first = Arc::new(Tracked { drops: &drops });
            let second = Arc::clone(&first);
            let third = Arc::clone(&second);
            assert_eq!(third.type_id(), 4242);

            drop(first);
            drop(second);
            assert_eq!(drops.load(Ordering::SeqCst), 0);
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identity_via_trait_object() {
        let drops = AtomicUsize::new(0);
        let object: Box<dyn RttiObject + '_> = Box::new(Tracked { drops: &drops });
        assert_eq!(object.type_id(), 4242);
        assert_eq!(object.type_name(), "Tracked");
    }
}
