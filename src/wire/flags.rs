//! In-memory representation of meta protocol flag tokens.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::{Duration, Instant};

/// Expiry behavior for a stored value. `0` on the wire always means
/// "never expires"; any other instant is clamped up to at least one second
/// from now so a near-future expiry can never be silently downgraded into
/// "never expires" by truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeToLive {
    /// Emits `T0`.
    Indefinite,
    /// Emits `T<seconds>`, ceiling-ed to at least one second.
    ExpiresAt(Instant),
}

impl TimeToLive {
    /// Computes the wire value relative to `now`.
    pub fn seconds_from(self, now: Instant) -> u64 {
        match self {
            TimeToLive::Indefinite => 0,
            TimeToLive::ExpiresAt(at) => {
                if at <= now {
                    1
                } else {
                    (at - now).as_secs().max(1)
                }
            },
        }
    }

    /// Convenience constructor for "expires `secs` from now".
    pub fn in_seconds(secs: u64) -> Self {
        TimeToLive::ExpiresAt(Instant::now() + Duration::from_secs(secs))
    }
}

/// Storage mode for a meta-set command (`M` token).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Unconditional set. Emits `MS`.
    Set,
    /// Store only if the key does not already exist. Emits `ME`.
    Add,
    /// Append to the existing value; fails if absent. Emits `MA`.
    Append,
    /// Prepend to the existing value; fails if absent. Emits `MP`.
    Prepend,
    /// Store only if the key already exists. Emits `MR`.
    Replace,
}

impl StorageMode {
    /// The single-letter mode code carried by the `M` flag token.
    pub(crate) fn code(self) -> char {
        match self {
            StorageMode::Set => 'S',
            StorageMode::Add => 'E',
            StorageMode::Append => 'A',
            StorageMode::Prepend => 'P',
            StorageMode::Replace => 'R',
        }
    }
}

/// Operation for a meta-arithmetic command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticMode {
    /// `M+ D<delta>`.
    Increment(u64),
    /// `M- D<delta>`.
    Decrement(u64),
}

/// Flag set shared by every request variant. Fields irrelevant to a given
/// command are simply left at their default and ignored by the encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    /// Request the value in the data block (`v`), or, for arithmetic, the
    /// post-operation value.
    pub return_value: bool,
    /// TTL to apply (meta-set) or extend (meta-get/touch).
    pub ttl: Option<TimeToLive>,
    /// Ask the server to return the remaining TTL (`t`).
    pub return_ttl: bool,
    /// Storage mode for meta-set.
    pub storage_mode: Option<StorageMode>,
    /// Operation for meta-arithmetic.
    pub arithmetic_mode: Option<ArithmeticMode>,
}

impl Flags {
    /// Flags requesting the stored value back (`mg <key> v`).
    pub fn get_value() -> Self {
        Flags {
            return_value: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indefinite_ttl_is_zero_seconds() {
        assert_eq!(TimeToLive::Indefinite.seconds_from(Instant::now()), 0);
    }

    #[test]
    fn past_or_present_expiry_ceils_to_one_second() {
        let now = Instant::now();
        assert_eq!(TimeToLive::ExpiresAt(now).seconds_from(now), 1);
    }

    #[test]
    fn future_expiry_rounds_down_but_floors_at_one() {
        let now = Instant::now();
        let ttl = TimeToLive::ExpiresAt(now + Duration::from_millis(89_400));
        assert_eq!(ttl.seconds_from(now), 89);
    }
}
