use super::align_vectors;
use crate::errors::InputValidationError;
use rand::{
    Rng,
    SeedableRng,
};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{
    AtomicUsize,
    Ordering,
};
use tracing::debug;

pub const DEFAULT_NULL_MODEL_SAMPLES: usize = 1000;

/// Distribution of alignment distances between random MIDs of fixed lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NullModel {
    pub mean_distance: f64,
    pub sd_distance: f64,
}

impl NullModel {
    /// `None` when the model has no spread.
    pub fn zscore(&self, distance: f64) -> Option<f64> {
        if self.sd_distance == 0.0 || !self.sd_distance.is_finite() {
            return None;
        }
        let z = (distance - self.mean_distance) / self.sd_distance;
        z.is_finite().then_some(z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    short_len: usize,
    long_len: usize,
    gap_bits: u64,
}

impl CacheKey {
    fn new(len1: usize, len2: usize, gap_penalty: f64) -> Self {
        Self {
            short_len: len1.min(len2),
            long_len: len1.max(len2),
            gap_bits: gap_penalty.to_bits(),
        }
    }
}

/// Monte-Carlo null models keyed by the unordered pair of MID lengths.
///
/// The cache is shared by reference between alignment tasks. Entries are
/// only dropped through [`NullModelCache::reset`].
#[derive(Debug)]
pub struct NullModelCache {
    models: RwLock<HashMap<CacheKey, NullModel>>,
    samples: usize,
    seed: Option<u64>,
    simulations: AtomicUsize,
}

impl Default for NullModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_NULL_MODEL_SAMPLES)
    }
}

impl NullModelCache {
    pub fn new(samples: usize) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            samples,
            seed: None,
            simulations: AtomicUsize::new(0),
        }
    }

    /// Same as [`NullModelCache::new`] but every simulation is reproducible.
    pub fn with_seed(samples: usize, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new(samples)
        }
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Number of null models simulated since construction or the last reset.
    pub fn simulation_count(&self) -> usize {
        self.simulations.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.models.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        match self.models.write() {
            Ok(mut m) => m.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.simulations.store(0, Ordering::Relaxed);
    }

    fn lookup(&self, key: &CacheKey) -> Option<NullModel> {
        match self.models.read() {
            Ok(m) => m.get(key).copied(),
            Err(poisoned) => poisoned.into_inner().get(key).copied(),
        }
    }

    fn insert(&self, key: CacheKey, model: NullModel) -> NullModel {
        let mut guard = match self.models.write() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Two workers can race on the same miss, the first insert wins.
        *guard.entry(key).or_insert(model)
    }

    pub fn get_or_simulate(
        &self,
        len1: usize,
        len2: usize,
        gap_penalty: f64,
    ) -> Result<NullModel, InputValidationError> {
        if len1 == 0 || len2 == 0 {
            return Err(InputValidationError::EmptyMid {
                context: "NullModelCache::get_or_simulate",
            });
        }
        let key = CacheKey::new(len1, len2, gap_penalty);
        if let Some(model) = self.lookup(&key) {
            return Ok(model);
        }
        let model = self.simulate(&key)?;
        Ok(self.insert(key, model))
    }

    /// Simulates every missing length pair in parallel on the current pool.
    pub fn warm(
        &self,
        length_pairs: impl IntoIterator<Item = (usize, usize)>,
        gap_penalty: f64,
    ) -> Result<(), InputValidationError> {
        let mut keys: Vec<CacheKey> = length_pairs
            .into_iter()
            .map(|(a, b)| CacheKey::new(a, b, gap_penalty))
            .filter(|k| self.lookup(k).is_none())
            .collect();
        keys.sort_by_key(|k| (k.short_len, k.long_len));
        keys.dedup();
        if keys.is_empty() {
            return Ok(());
        }
        debug!("Warming null model cache with {} length pairs", keys.len());

        let simulated = keys
            .into_par_iter()
            .map(|k| self.simulate(&k).map(|m| (k, m)))
            .collect::<Result<Vec<_>, _>>()?;
        for (key, model) in simulated {
            self.insert(key, model);
        }
        Ok(())
    }

    fn rng_for(&self, key: &CacheKey) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => {
                let mixed = seed
                    ^ (key.short_len as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                    ^ (key.long_len as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
                    ^ key.gap_bits.rotate_left(17);
                ChaCha8Rng::seed_from_u64(mixed)
            }
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn simulate(&self, key: &CacheKey) -> Result<NullModel, InputValidationError> {
        let gap_penalty = f64::from_bits(key.gap_bits);
        let mut rng = self.rng_for(key);
        let mut distances = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            let v1 = random_mid(&mut rng, key.short_len);
            let v2 = random_mid(&mut rng, key.long_len);
            distances.push(align_vectors(&v1, &v2, gap_penalty)?.distance);
        }
        self.simulations.fetch_add(1, Ordering::Relaxed);

        let model = NullModel {
            mean_distance: crate::stats::mean(&distances),
            sd_distance: crate::stats::std_dev(&distances, 0),
        };
        debug!(
            "Simulated null model for lengths ({}, {}): mean={:.5} sd={:.5}",
            key.short_len, key.long_len, model.mean_distance, model.sd_distance
        );
        Ok(model)
    }
}

fn random_mid(rng: &mut ChaCha8Rng, len: usize) -> Vec<f64> {
    let mut v: Vec<f64> = (0..len).map(|_| rng.gen_range(0.0..1.0)).collect();
    let total: f64 = v.iter().sum();
    if total > 0.0 {
        v.iter_mut().for_each(|x| *x /= total);
    }
    v
}
