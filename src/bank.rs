use std::collections::BTreeMap;
use std::sync::Arc;
use parking_lot::RwLock;
use tracing::{debug, warn};
use crate::config::GenerationConfig;
use crate::scale::{generate_scale, GeneratedScale, ScaleKind};

/// One generated scale per template key, always regenerated as a batch.
///
/// Each entry is its own draw over every enabled template, so the key names
/// the slot rather than forcing the template; `GeneratedScale::template`
/// records what was actually used.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBank {
    scales: BTreeMap<ScaleKind, GeneratedScale>,
    config: GenerationConfig,
}

impl ScaleBank {
    /// Builds a full bank. Entries whose constraints are infeasible come out
    /// empty instead of failing the batch.
    pub fn generate(config: &GenerationConfig, rng: &mut fastrand::Rng) -> Self {
        let mut scales = BTreeMap::new();
        for kind in ScaleKind::ALL {
            let scale = match generate_scale(config, rng) {
                Ok(scale) => scale,
                Err(e) => {
                    warn!(slot = kind.name(), "{}; slot left empty", e);
                    GeneratedScale::empty()
                }
            };
            scales.insert(kind, scale);
        }
        debug!(
            filled = scales.values().filter(|s| !s.is_empty()).count(),
            "scale bank regenerated"
        );
        ScaleBank { scales, config: config.clone() }
    }

    pub fn get(&self, kind: ScaleKind) -> &GeneratedScale {
        // every key is inserted by `generate`
        &self.scales[&kind]
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScaleKind, &GeneratedScale)> {
        self.scales.iter().map(|(k, s)| (*k, s))
    }

    /// Uniform choice over the five slots, empty ones included.
    pub fn pick_random(&self, rng: &mut fastrand::Rng) -> (ScaleKind, &GeneratedScale) {
        let kind = ScaleKind::ALL[rng.usize(..ScaleKind::ALL.len())];
        (kind, self.get(kind))
    }
}

/// Swappable handle to the current bank. Readers hold an `Arc` to a complete
/// bank; a regeneration replaces the whole value at once.
#[derive(Debug, Clone)]
pub struct SharedBank {
    current: Arc<RwLock<Arc<ScaleBank>>>,
}

impl SharedBank {
    pub fn new(bank: ScaleBank) -> Self {
        SharedBank { current: Arc::new(RwLock::new(Arc::new(bank))) }
    }

    pub fn load(&self) -> Arc<ScaleBank> {
        Arc::clone(&self.current.read())
    }

    /// Installs `bank` and hands back the one it replaced.
    pub fn swap(&self, bank: ScaleBank) -> Arc<ScaleBank> {
        std::mem::replace(&mut *self.current.write(), Arc::new(bank))
    }
}
