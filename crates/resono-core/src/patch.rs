//! In-memory instrument definition.

use alloc::string::String;

use crate::envelope::Envelope;
use crate::fm::FmGraph;

/// Default number of voices for new patches.
pub const DEFAULT_POLYPHONY: usize = 8;

/// Everything needed to build an [`FmInstrument`](crate::FmInstrument):
/// the graph, the envelope and the voice count.
///
/// ```rust
/// use resono_core::{Envelope, FmGraph, Patch};
///
/// let patch = Patch::new("Organ")
///     .with_polyphony(4)
///     .with_envelope(Envelope::from_seconds(1.0, 1.0, 0.005, 0.0, 0.05, 48000));
/// assert_eq!(patch.polyphony, 4);
/// assert_eq!(patch.graph, FmGraph::sine());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    /// Display name
    pub name: String,
    /// Number of voices, at least 1
    pub polyphony: usize,
    /// Oscillator graph
    pub graph: FmGraph,
    /// Amplitude envelope
    pub envelope: Envelope,
}

impl Default for Patch {
    fn default() -> Self {
        Self::new("Sine")
    }
}

impl Patch {
    /// A sine patch with the default envelope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            polyphony: DEFAULT_POLYPHONY,
            graph: FmGraph::sine(),
            envelope: Envelope::default(),
        }
    }

    /// Set the voice count, clamped to at least 1.
    pub fn with_polyphony(mut self, polyphony: usize) -> Self {
        self.polyphony = polyphony.max(1);
        self
    }

    /// Replace the graph.
    pub fn with_graph(mut self, graph: FmGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Replace the envelope.
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }
}
