//! Application layer: the request-side API that external handlers
//! (out of scope, §1) call into. Thin orchestration over the domain
//! services — the Lab Use Case never touches storage directly except
//! through `LabRepository`/`CveRepository` read paths and the
//! Mutation Service for every write (§9 design note).

pub mod lab_use_case;

pub use lab_use_case::{CreateDraftInput, LabUseCase};
