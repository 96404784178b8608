//! Address module for ephemail.
//!
//! This module provides the disposable address lifecycle:
//! - Allocation of unique, randomly generated addresses
//! - Lookup of live addresses
//! - Cascading deletion, on expiry or on request
//! - Format validation for generated addresses

mod allocator;
mod repository;
mod service;
mod types;
mod validation;

pub use allocator::{AddressAllocator, CandidateSource, RandomLocalPart};
pub use repository::AddressRepository;
pub use service::AddressService;
pub use types::{Address, Attribution, NewAddress};
pub use validation::{
    is_valid_domain, is_well_formed_address, normalize_recipient, validate_address,
    LOCAL_PART_ALPHABET, LOCAL_PART_LENGTH,
};
