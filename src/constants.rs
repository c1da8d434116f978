//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Length budget constants
pub mod budget {
    /// Word-count tier breakpoints (inclusive upper bounds).
    ///
    /// Inputs with 0-2 words land in tier 0, 3-8 in tier 1, 9-20 in tier 2,
    /// everything longer in tier 3.
    pub const TIER_UPPER_BOUNDS: [usize; 3] = [2, 8, 20];

    /// Narrative profile (sentence, word) ceilings per tier
    pub const NARRATIVE_TIERS: [(u32, u32); 4] = [(1, 10), (1, 20), (2, 40), (3, 70)];

    /// Task profile (sentence, word) ceilings per tier.
    ///
    /// Every pair is >= the narrative pair at the same tier.
    pub const TASK_TIERS: [(u32, u32); 4] = [(2, 30), (2, 50), (3, 80), (4, 120)];

    /// Output tokens generated per allowed word
    pub const TOKENS_PER_WORD: f64 = 1.7;

    /// Narrative profile output token floor
    pub const NARRATIVE_TOKEN_FLOOR: u32 = 60;

    /// Narrative profile output token ceiling
    pub const NARRATIVE_TOKEN_CEIL: u32 = 800;

    /// Task profile output token floor (single object)
    pub const TASK_TOKEN_FLOOR: u32 = 120;

    /// Task profile output token ceiling (single object)
    pub const TASK_TOKEN_CEIL: u32 = 1024;

    /// Output token allowance per requested element in an array request
    pub const TOKENS_PER_ARRAY_ITEM: u32 = 256;

    /// Array request output token floor
    pub const ARRAY_TOKEN_FLOOR: u32 = 512;

    /// Array request output token ceiling
    pub const ARRAY_TOKEN_CEIL: u32 = 2048;
}

/// Lenient parser constants
pub mod parser {
    /// Object keys searched by the keyed-subtree extraction tier
    pub const KNOWN_ARRAY_KEYS: [&str; 3] = ["tasks", "items", "suggestions"];

    /// Characters of raw content included in failure messages
    pub const FAILURE_PREVIEW_CHARS: usize = 200;
}

/// Request governor constants
pub mod governor {
    /// Default fixed-window duration (seconds)
    pub const DEFAULT_WINDOW_SECS: u64 = 60;

    /// Default maximum generation calls per window
    pub const DEFAULT_MAX_PER_WINDOW: u32 = 10;

    /// Characters of input text included in the cache key signature
    pub const CACHE_KEY_INPUT_CHARS: usize = 160;
}
