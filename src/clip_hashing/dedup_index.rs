use log::{debug, info};
use parking_lot::Mutex;

use super::{Fingerprint, HashStore, HashStoreError};

/// Result of testing a fingerprint against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// No indexed fingerprint was within the threshold. The fingerprint is now indexed.
    Accepted,
    /// An indexed fingerprint lies `distance` bits away, below the threshold.
    Duplicate { distance: u32 },
}

struct IndexInner {
    fingerprints: Vec<Fingerprint>,
    store: Box<dyn HashStore>,
}

/// Every accepted fingerprint, in memory and in a [`HashStore`].
///
/// A fingerprint is a near-duplicate when its Hamming distance to any indexed fingerprint
/// is strictly less than the threshold. Test and insert happen under one lock, so two
/// near-identical clips can never both be accepted.
///
/// Lookup is a linear scan. Bucketing by hash prefix would miss near-duplicates whose
/// differing bits fall inside the prefix, and a dataset of this kind stays small enough
/// for a scan over a few words per entry.
pub struct PerceptualHashIndex {
    threshold: u32,
    inner: Mutex<IndexInner>,
}

impl PerceptualHashIndex {
    /// Load every stored fingerprint. Must complete before any clip is tested.
    pub fn load(mut store: Box<dyn HashStore>, threshold: u32) -> Result<Self, HashStoreError> {
        let fingerprints = store.load()?;
        info!(
            target: "dedup_index",
            "dedup index ready with {} fingerprints (threshold {})",
            fingerprints.len(),
            threshold
        );

        Ok(Self {
            threshold,
            inner: Mutex::new(IndexInner {
                fingerprints,
                store,
            }),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.inner.lock().fingerprints.len()
    }

    /// Distance to the closest indexed fingerprint, if any are indexed.
    pub fn nearest_distance(&self, fingerprint: &Fingerprint) -> Option<u32> {
        self.inner
            .lock()
            .fingerprints
            .iter()
            .map(|indexed| indexed.hamming_distance(fingerprint))
            .min()
    }

    /// Accept the fingerprint if it is not a near-duplicate, persisting it before
    /// returning. On a store error nothing is indexed.
    pub fn test_and_insert(
        &self,
        fingerprint: Fingerprint,
    ) -> Result<DedupVerdict, HashStoreError> {
        let mut inner = self.inner.lock();

        let near_duplicate = inner
            .fingerprints
            .iter()
            .map(|indexed| indexed.hamming_distance(&fingerprint))
            .find(|distance| *distance < self.threshold);

        if let Some(distance) = near_duplicate {
            debug!(target: "dedup_index", "{fingerprint} is {distance} bits from an indexed clip");
            return Ok(DedupVerdict::Duplicate { distance });
        }

        inner.store.append(&fingerprint)?;
        inner.fingerprints.push(fingerprint);

        Ok(DedupVerdict::Accepted)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use rand::prelude::*;

    use super::*;
    use crate::FileHashStore;

    #[derive(Default)]
    struct MemStore {
        preloaded: Vec<Fingerprint>,
        appended: Arc<Mutex<Vec<Fingerprint>>>,
        fail_appends: bool,
    }

    impl HashStore for MemStore {
        fn load(&mut self) -> Result<Vec<Fingerprint>, HashStoreError> {
            Ok(self.preloaded.clone())
        }

        fn append(&mut self, fingerprint: &Fingerprint) -> Result<(), HashStoreError> {
            if self.fail_appends {
                return Err(HashStoreError::HashFileIo {
                    src: std::io::ErrorKind::PermissionDenied.into(),
                    path: "mem".into(),
                });
            }
            self.appended.lock().push(*fingerprint);
            Ok(())
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let mut rng = StdRng::seed_from_u64(7);
        let threshold = 32;
        let base = Fingerprint::random(&mut rng);
        let index = PerceptualHashIndex::load(
            Box::new(MemStore {
                preloaded: vec![base],
                ..MemStore::default()
            }),
            threshold,
        )
        .unwrap();

        let just_below = base.at_distance(threshold - 1, &mut rng);
        assert_eq!(
            index.test_and_insert(just_below).unwrap(),
            DedupVerdict::Duplicate {
                distance: threshold - 1
            }
        );

        // exactly at the threshold counts as distinct
        let at_threshold = base.at_distance(threshold, &mut rng);
        assert_eq!(index.nearest_distance(&at_threshold), Some(threshold));
        assert_eq!(
            index.test_and_insert(at_threshold).unwrap(),
            DedupVerdict::Accepted
        );
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_accepted_fingerprints_are_persisted_and_compared_against() {
        let mut rng = StdRng::seed_from_u64(8);
        let appended = Arc::new(Mutex::new(vec![]));
        let index = PerceptualHashIndex::load(
            Box::new(MemStore {
                appended: appended.clone(),
                ..MemStore::default()
            }),
            20,
        )
        .unwrap();

        let first = Fingerprint::random(&mut rng);
        assert_eq!(index.test_and_insert(first).unwrap(), DedupVerdict::Accepted);
        assert_eq!(*appended.lock(), vec![first]);

        // the same clip a second time
        assert_eq!(
            index.test_and_insert(first).unwrap(),
            DedupVerdict::Duplicate { distance: 0 }
        );
        assert_eq!(appended.lock().len(), 1);
    }

    #[test]
    fn test_no_two_accepted_fingerprints_are_near_duplicates() {
        let mut rng = StdRng::seed_from_u64(9);
        let threshold = 40;
        let index = PerceptualHashIndex::load(Box::<MemStore>::default(), threshold).unwrap();

        // a mix of unrelated fingerprints and close variants of them
        let mut accepted = vec![];
        for _ in 0..200 {
            let candidate = match accepted.choose(&mut rng) {
                Some(prev) if rng.gen_bool(0.5) => {
                    let d = rng.gen_range(0..threshold * 2);
                    Fingerprint::at_distance(prev, d, &mut rng)
                }
                _ => Fingerprint::random(&mut rng),
            };
            if index.test_and_insert(candidate).unwrap() == DedupVerdict::Accepted {
                accepted.push(candidate);
            }
        }

        for (i, a) in accepted.iter().enumerate() {
            for b in &accepted[i + 1..] {
                assert!(a.hamming_distance(b) >= threshold);
            }
        }
    }

    #[test]
    fn test_store_failure_indexes_nothing() {
        let mut rng = StdRng::seed_from_u64(10);
        let index = PerceptualHashIndex::load(
            Box::new(MemStore {
                fail_appends: true,
                ..MemStore::default()
            }),
            10,
        )
        .unwrap();

        assert!(index.test_and_insert(Fingerprint::random(&mut rng)).is_err());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_restart_sees_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashes.txt");
        let mut rng = StdRng::seed_from_u64(11);
        let clip = Fingerprint::random(&mut rng);

        let index = PerceptualHashIndex::load(Box::new(FileHashStore::new(&path)), 16).unwrap();
        assert_eq!(index.test_and_insert(clip).unwrap(), DedupVerdict::Accepted);
        drop(index);

        let index = PerceptualHashIndex::load(Box::new(FileHashStore::new(&path)), 16).unwrap();
        let reencoded = clip.at_distance(3, &mut rng);
        assert_eq!(
            index.test_and_insert(reencoded).unwrap(),
            DedupVerdict::Duplicate { distance: 3 }
        );
    }
}
