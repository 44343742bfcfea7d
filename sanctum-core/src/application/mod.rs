mod enclave;

pub use enclave::{Enclave, EnclaveRegistry, DEFAULT_ENCLAVE};
