//! Key-progression playlist generation.

mod assembler;
mod draft;
mod publisher;

pub use assembler::{
    choose_starting_five, Budget, GenerationOutcome, GenerationRequest, PlaylistAssembler,
    TerminationReason, STARTING_SEQUENCE_LEN,
};
pub use draft::{format_duration_ms, DraftError, DraftSummary, PlaylistDraft, RECENT_ARTIST_WINDOW};
pub use publisher::PlaylistPublisher;
