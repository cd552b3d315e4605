//! The latest generation known per ring.

use std::collections::HashMap;
use std::collections::hash_map::Entry::{Occupied, Vacant};

use federa_common::log::debug;
use federa_proto::{Generation, RingName};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationCheck {
    /// Same as the known generation, or the first one seen for the ring.
    Current,
    /// Newer than the known generation; it is now the known one.
    Adopted { previous: Generation },
    Stale { known: Generation },
}

#[derive(Debug, Default)]
pub struct GenerationState {
    rings: RwLock<HashMap<RingName, Generation>>,
}

impl GenerationState {
    pub fn get(&self, ring: &RingName) -> Option<Generation> {
        self.rings.read().get(ring).copied()
    }

    /// Records `generation` as known for `ring` unless a newer one is known.
    pub fn set(&self, ring: RingName, generation: Generation) {
        let mut rings = self.rings.write();
        let known = rings.entry(ring).or_insert(generation);
        if *known < generation {
            *known = generation;
        }
    }

    pub fn observe(&self, ring: &RingName, generation: Generation) -> GenerationCheck {
        if let Some(known) = self.get(ring) {
            if known == generation {
                return GenerationCheck::Current
            }
            if generation < known {
                return GenerationCheck::Stale { known }
            }
        }

        let mut rings = self.rings.write();
        match rings.entry(ring.clone()) {
            Vacant(vacant) => {
                vacant.insert(generation);
                GenerationCheck::Current
            },
            Occupied(mut occupied) => {
                let known = *occupied.get();
                if generation < known {
                    GenerationCheck::Stale { known }
                } else if generation == known {
                    GenerationCheck::Current
                } else {
                    debug!(%ring, from = %known, to = %generation, "adopting newer generation");
                    occupied.insert(generation);
                    GenerationCheck::Adopted { previous: known }
                }
            },
        }
    }
}
