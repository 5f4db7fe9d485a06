mod dct_3d;
mod dedup_index;
mod fingerprint;
mod hash_store;
mod raw_dct_ops;

pub use dedup_index::{DedupVerdict, PerceptualHashIndex};
pub use fingerprint::{Fingerprint, FingerprintError};
pub use hash_store::{FileHashStore, HashStore, HashStoreError};
