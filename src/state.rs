/// Where the [`Tokenizer`](crate::tokenizer::Tokenizer) is within the
/// multipart framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    ReadingFirstBoundary,
    DeterminingBoundaryType,
    ReadingTransportPadding,
    ReadingFieldHeaders,
    ReadingFieldData,
    Eof,
}

/// Lifecycle of a [`Decoder`](crate::Decoder).
///
/// `Idle → Parsing → {Completed, Failed}`. The terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    Parsing,
    Completed,
    Failed,
}

impl DecodeState {
    /// Returns `true` once the decoder has settled its outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, DecodeState::Completed | DecodeState::Failed)
    }
}
