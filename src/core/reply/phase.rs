use std::fmt;

/// Lifecycle of one streamed bot reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPhase {
    Pending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Fragment,
    EndOfStream,
    TransportError,
    Cancel,
}

impl ReplyPhase {
    /// Terminal phases absorb every further transition.
    #[must_use]
    pub const fn on(self, transition: Transition) -> Self {
        if self.is_terminal() {
            return self;
        }
        match transition {
            Transition::Fragment => Self::Streaming,
            Transition::EndOfStream => Self::Completed,
            Transition::TransportError => Self::Failed,
            Transition::Cancel => Self::Cancelled,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ReplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
