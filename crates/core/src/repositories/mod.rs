//! Store operations grouped by entity.
//!
//! Each module adds an `impl Store` block for one slice of the data model.
//! Pure data operations only; route guards and HTTP mapping live upstream.

pub mod audit;
pub mod clinics;
pub mod consultations;
pub mod patients;
pub mod staff;
pub mod verification;
pub mod vitals;
