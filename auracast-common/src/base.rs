//! BASE descriptor data model
//!
//! The BASE (Broadcast Audio Source Endpoint) announces the sub-streams a
//! broadcast source carries: an ordered sequence of subgroups, each holding
//! an ordered sequence of (BIS index, codec parameters). The wire format is
//! owned by the radio stack; this module only models the parsed entity and
//! derives the index mask the sink joins.

/// Codec parameters announced per BIS.
///
/// Both fields must resolve for decoding to be configured; a missing value
/// disables decoding for the session (handled by the decode pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecParams {
    /// Sampling frequency in Hz, if announced
    pub sample_rate_hz: Option<u32>,

    /// Frame duration in microseconds, if announced
    pub frame_duration_us: Option<u32>,
}

/// One BIS entry within a subgroup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BisEntry {
    /// BIS index within the broadcast
    pub index: u8,

    /// Codec parameters for this BIS
    pub params: CodecParams,
}

/// One subgroup of the BASE
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Subgroup {
    /// BIS entries in announcement order
    pub bis: Vec<BisEntry>,
}

/// Parsed BASE descriptor
///
/// Invariant: BIS indices are unique across all subgroups. Indices outside
/// the supported range are dropped from the mask but do not invalidate the
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaseDescriptor {
    /// Subgroups in announcement order
    pub subgroups: Vec<Subgroup>,
}

impl BaseDescriptor {
    /// Number of subgroups in the descriptor
    pub fn subgroup_count(&self) -> usize {
        self.subgroups.len()
    }

    /// Compute the BIS index bit mask intersected with the supported range.
    ///
    /// The supported mask is `max_streams + 1` bits wide, matching the fixed
    /// number of stream endpoints the sink allocates. Indices past the mask
    /// width are dropped silently.
    pub fn bis_mask(&self, max_streams: u8) -> u32 {
        let width = u32::from(max_streams) + 1;
        let supported = mask_of_width(width);

        let mut mask = 0u32;
        for subgroup in &self.subgroups {
            for entry in &subgroup.bis {
                if u32::from(entry.index) < u32::BITS {
                    mask |= 1 << entry.index;
                }
            }
        }

        mask & supported
    }

    /// Codec parameters negotiated for the session.
    ///
    /// The sink decodes every joined BIS with one decoder configuration, so
    /// the first announced entry is authoritative.
    pub fn codec_params(&self) -> Option<CodecParams> {
        self.subgroups
            .iter()
            .flat_map(|sg| sg.bis.iter())
            .next()
            .map(|entry| entry.params)
    }
}

fn mask_of_width(width: u32) -> u32 {
    if width >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}
