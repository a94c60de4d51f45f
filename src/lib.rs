//! Simulates the MR signal of a 2D phantom and reconstructs images from it.
//! The API is split into a few independent pieces that only meet at plain
//! data types:
//!
//! - a [`Phantom`] holds the tissue maps, a [`SpinEnsemble`] the isochromat
//!   offsets used to model intra-voxel dephasing,
//! - a [`Sequence`] is a table of events (pulses, gradient moments, timing
//!   and ADC samples), built by hand or imported from a pulseq file,
//! - the [`Scanner`] turns those into a [`Signal`],
//! - the [`Reconstructor`] turns a signal back into [`Image`]s.
//!
//! ```no_run
//! use mrtwin::{Phantom, Reconstructor, RecoMode, Scanner, SimConfig, SpinEnsemble};
//! use mrtwin::sequence::pulseq::{from_pulseq_file, ImportOptions};
//!
//! # fn main() -> mrtwin::Result<()> {
//! let phantom = Phantom::new(32, 32)?;
//! let spins = SpinEnsemble::cauchy(64, phantom.voxel_count(), 50.0, 0.99)?;
//! let seq = from_pulseq_file("gre.seq", &ImportOptions::default())?;
//!
//! let signal = Scanner::new(SimConfig::default()).forward(&phantom, &spins, &seq)?;
//! let images = Reconstructor::for_phantom(&phantom).reconstruct(&signal, &seq, RecoMode::Auto)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod phantom;
pub mod reco;
pub mod sequence;
pub mod simulate;
pub mod spins;
pub mod util;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use phantom::{Phantom, Voxel};
pub use reco::{Image, RecoMode, Reconstructor};
pub use sequence::{Event, Sequence, SequenceClass};
pub use simulate::{Scanner, Signal};
pub use spins::SpinEnsemble;
