//! Frame-level encoding hints carried as a bitmask on the wire.

const FLAG_FULL_FRAME: u32 = 0x1;
const FLAG_SPLIT_ALPHA: u32 = 0x2;

/// Bitmask of frame hints. Unknown bits survive a round trip untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EncodingOptions(u32);

/// Decoded view of [`EncodingOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingFlags {
    /// The fragment list covers the whole surface rather than a damage diff.
    pub full_frame: bool,
    /// `alpha` is a separately encoded channel to recombine with `opaque`.
    pub split_alpha: bool,
}

impl EncodingOptions {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn with_full_frame(self) -> Self {
        Self(self.0 | FLAG_FULL_FRAME)
    }

    pub const fn with_split_alpha(self) -> Self {
        Self(self.0 | FLAG_SPLIT_ALPHA)
    }

    pub const fn is_full_frame(self) -> bool {
        self.0 & FLAG_FULL_FRAME != 0
    }

    pub const fn is_split_alpha(self) -> bool {
        self.0 & FLAG_SPLIT_ALPHA != 0
    }

    pub fn decode(self) -> EncodingFlags {
        EncodingFlags {
            full_frame: self.is_full_frame(),
            split_alpha: self.is_split_alpha(),
        }
    }

    pub fn encode(flags: EncodingFlags) -> Self {
        let mut options = Self::empty();
        if flags.full_frame {
            options = options.with_full_frame();
        }
        if flags.split_alpha {
            options = options.with_split_alpha();
        }
        options
    }
}

impl From<EncodingFlags> for EncodingOptions {
    fn from(flags: EncodingFlags) -> Self {
        Self::encode(flags)
    }
}
