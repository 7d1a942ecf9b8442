//! Drop or redact whole records while a stream goes through a pipeline.
use std::collections::HashSet;

use log::debug;
use serde::Deserialize;

use crate::stream::hook::with_header;
use crate::stream::{StreamError, StreamType, Transform, TransformContext};

/// Which record types to touch, by name as in `["SecurityData"]`
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RewriteConfig {
    /// Removed from the stream, header included
    pub drop: Vec<StreamType>,

    /// Kept, with the payload replaced by zeros
    pub redact: Vec<StreamType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Keep,
    Drop,
    Redact,
}

/// Applies a [`RewriteConfig`] to every record.
///
/// A record only disappears completely if the pipeline hands its header to
/// the transform, readers need a buffer larger than the header for that.
#[derive(Debug, Default)]
pub struct Rewrite {
    drop: HashSet<StreamType>,
    redact: HashSet<StreamType>,
    dropped: usize,
    redacted: usize,
}

impl Rewrite {
    pub fn new(config: &RewriteConfig) -> Self {
        Rewrite {
            drop: config.drop.iter().copied().collect(),
            redact: config.redact.iter().copied().collect(),
            dropped: 0,
            redacted: 0,
        }
    }

    /// Dropping wins over redacting.
    pub fn action(&self, id: StreamType) -> Action {
        if self.drop.contains(&id) {
            Action::Drop
        } else if self.redact.contains(&id) {
            Action::Redact
        } else {
            Action::Keep
        }
    }

    /// Records dropped so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Records redacted so far
    pub fn redacted(&self) -> usize {
        self.redacted
    }
}

impl Transform for Rewrite {
    fn transform(&mut self, ctx: &mut TransformContext<'_>, data: &[u8]) -> Result<Vec<u8>, StreamError> {
        let action = self.action(ctx.header.id);
        if ctx.header.is_active() && action != Action::Keep {
            debug!("{:?} {}", action, ctx.header);
            match action {
                Action::Drop => self.dropped += 1,
                Action::Redact => self.redacted += 1,
                Action::Keep => (),
            }
        }

        match action {
            Action::Keep => with_header(ctx, data.to_vec()),
            Action::Drop => Ok(vec![]),
            Action::Redact => with_header(ctx, vec![0; data.len()]),
        }
    }
}
