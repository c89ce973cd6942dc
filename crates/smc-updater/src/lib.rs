//! Update verification for the secure messenger core.
//!
//! Release manifests are fetched from a content-addressed channel (IPFS
//! gateways, with an IPNS name pointing at the latest manifest), checked
//! against pinned Ed25519 publisher keys, and compared with the running
//! version. Nothing is trusted until the signature verifies. Downloading and
//! installing the package itself is left to the host.

pub mod checker;
pub mod config;
pub mod error;
pub mod manifest;
pub mod source;
pub mod testing;
pub mod version;

#[cfg(test)]
mod proptests;

pub use checker::{UpdateCheck, UpdateChecker, UpdateState};
pub use config::UpdaterConfig;
pub use error::UpdateError;
pub use manifest::{ManifestSignature, ManifestVerifier, SignedManifest, UpdateCandidate};
pub use source::{ContentSource, GatewaySource, ManifestPointer, StaticSource};
pub use version::parse_lenient;
