//! Bounded pool of HARQ soft-combining buffers
//!
//! A [`BufferPool`] owns a fixed-capacity collection of [`CombiningBuffer`] objects, one per
//! live [`SessionId`]. A reservation either returns the existing buffer for the session (for a
//! retransmission, with its accumulated soft bits intact) or allocates a fresh one, evicting the
//! least-recently-touched buffers when the pool would otherwise exceed its buffer or codeblock
//! budget. Buffers not touched for longer than the configured expiration horizon are treated as
//! absent when matching a reservation, and are physically reclaimed when the pool clock advances.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Capacity and expiration configuration of a buffer pool
#[derive(Clone, Eq, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum number of soft bits per codeblock
    pub max_codeblock_size: usize,
    /// Maximum number of simultaneously live buffers
    pub max_buffers: usize,
    /// Maximum total number of codeblocks across all live buffers
    pub max_codeblocks: usize,
    /// Buffer expiration horizon as a number of slots
    pub expire_timeout_slots: u64,
}

/// Identifier of one logical HARQ combining stream: the (subscriber, process) pair
#[derive(Clone, Eq, Hash, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SessionId {
    /// Radio network temporary identifier of the subscriber
    pub rnti: u16,
    /// HARQ process identifier
    pub harq_id: u8,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(RNTI {}, HARQ {})", self.rnti, self.harq_id)
    }
}

/// Soft-combining buffer for one transport block
///
/// Holds the accumulated log-likelihood ratios for every codeblock of the transport block, plus
/// a CRC-pass flag per codeblock. Soft storage is sized for the pool's maximum codeblock size so
/// that a decode engine can combine any rate-matched codeblock in place.
#[derive(Clone, PartialEq, Debug)]
pub struct CombiningBuffer {
    /// Session identifier the buffer belongs to
    session: SessionId,
    /// Number of codeblocks in the current transport block
    nof_codeblocks: usize,
    /// Soft storage capacity per codeblock
    codeblock_size: usize,
    /// Pool slot at which the buffer was last reserved
    last_slot: u64,
    /// CRC-pass flag per codeblock
    crc_ok: Vec<bool>,
    /// Accumulated soft bits, `nof_codeblocks * codeblock_size` values
    soft_bits: Vec<f64>,
}

impl CombiningBuffer {
    /// Returns a zeroed buffer for the given session.
    fn new(session: SessionId, nof_codeblocks: usize, codeblock_size: usize, slot: u64) -> Self {
        Self {
            session,
            nof_codeblocks,
            codeblock_size,
            last_slot: slot,
            crc_ok: vec![false; nof_codeblocks],
            soft_bits: vec![0.0; nof_codeblocks * codeblock_size],
        }
    }

    /// Returns the session identifier the buffer belongs to.
    #[must_use]
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns the number of codeblocks in the current transport block.
    #[must_use]
    pub fn nof_codeblocks(&self) -> usize {
        self.nof_codeblocks
    }

    /// Returns the CRC-pass flag of the given codeblock.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `self.nof_codeblocks()`.
    #[must_use]
    pub fn codeblock_crc_ok(&self, index: usize) -> bool {
        self.crc_ok[index]
    }

    /// Sets the CRC-pass flag of the given codeblock.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `self.nof_codeblocks()`.
    pub fn set_codeblock_crc(&mut self, index: usize, ok: bool) {
        self.crc_ok[index] = ok;
    }

    /// Returns the accumulated soft bits of the given codeblock.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `self.nof_codeblocks()`.
    #[must_use]
    pub fn codeblock_soft_bits(&self, index: usize) -> &[f64] {
        assert!(index < self.nof_codeblocks);
        &self.soft_bits[index * self.codeblock_size .. (index + 1) * self.codeblock_size]
    }

    /// Returns the accumulated soft bits of the given codeblock for in-place combining.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `self.nof_codeblocks()`.
    pub fn codeblock_soft_bits_mut(&mut self, index: usize) -> &mut [f64] {
        assert!(index < self.nof_codeblocks);
        &mut self.soft_bits[index * self.codeblock_size .. (index + 1) * self.codeblock_size]
    }

    /// Clears the CRC-pass flags of all codeblocks, leaving the soft bits untouched.
    pub fn reset_codeblocks_crc(&mut self) {
        self.crc_ok.fill(false);
    }

    /// Resizes the buffer for a new transport block and clears all accumulated state.
    fn configure(&mut self, nof_codeblocks: usize) {
        self.nof_codeblocks = nof_codeblocks;
        self.crc_ok.clear();
        self.crc_ok.resize(nof_codeblocks, false);
        self.soft_bits.clear();
        self.soft_bits
            .resize(nof_codeblocks * self.codeblock_size, 0.0);
    }

    /// Marks the buffer as used at the given slot.
    fn touch(&mut self, slot: u64) {
        self.last_slot = slot;
    }

    /// Returns `true` if the buffer has not been touched within the expiration horizon.
    fn is_expired(&self, current_slot: u64, expire_timeout_slots: u64) -> bool {
        current_slot.saturating_sub(self.last_slot) > expire_timeout_slots
    }
}

/// Fixed-capacity pool of soft-combining buffers, at most one per session identifier
#[derive(Clone, PartialEq, Debug)]
pub struct BufferPool {
    /// Capacity and expiration configuration
    config: PoolConfig,
    /// Live buffers (expired ones linger until the next clock advance)
    buffers: Vec<CombiningBuffer>,
    /// Current pool slot, advanced by [`BufferPool::run_slot`]
    current_slot: u64,
}

impl BufferPool {
    /// Returns a pool with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any capacity field is zero, or if `max_buffers` exceeds
    /// `max_codeblocks` (every live buffer holds at least one codeblock, so the extra buffers
    /// could never be used).
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        if config.max_codeblock_size == 0 {
            return Err(Error::InvalidArgument(
                "Maximum codeblock size cannot be zero".to_string(),
            ));
        }
        if config.max_buffers == 0 {
            return Err(Error::InvalidArgument(
                "Maximum number of buffers cannot be zero".to_string(),
            ));
        }
        if config.max_codeblocks == 0 {
            return Err(Error::InvalidArgument(
                "Maximum number of codeblocks cannot be zero".to_string(),
            ));
        }
        if config.max_buffers > config.max_codeblocks {
            return Err(Error::InvalidArgument(format!(
                "Maximum number of buffers ({}) exceeds maximum number of codeblocks ({})",
                config.max_buffers, config.max_codeblocks
            )));
        }
        Ok(Self {
            config,
            buffers: Vec::with_capacity(config.max_buffers),
            current_slot: 0,
        })
    }

    /// Returns the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the current pool slot.
    #[must_use]
    pub fn current_slot(&self) -> u64 {
        self.current_slot
    }

    /// Advances the pool clock to the given slot and reclaims expired buffers.
    pub fn run_slot(&mut self, slot: u64) {
        self.current_slot = slot;
        let (current_slot, timeout) = (self.current_slot, self.config.expire_timeout_slots);
        self.buffers
            .retain(|buffer| !buffer.is_expired(current_slot, timeout));
    }

    /// Advances the pool clock by one slot.
    pub fn advance_slot(&mut self) {
        self.run_slot(self.current_slot + 1);
    }

    /// Reserves the combining buffer for the given session identifier.
    ///
    /// If a live (non-expired) buffer exists for `session`, it is returned: unchanged for a
    /// retransmission (`is_new_data` false), or cleared and resized to `nof_codeblocks` for a
    /// new transmission. If none exists, a fresh buffer is allocated, evicting the
    /// least-recently-touched buffers as needed to stay within the pool's buffer and codeblock
    /// budgets. Every reservation touches the buffer's last-used slot marker.
    ///
    /// # Errors
    ///
    /// Returns an error if `nof_codeblocks` is zero, if `nof_codeblocks` alone exceeds the
    /// pool's codeblock budget, or if a retransmission declares a codeblock count different
    /// from the one stored in the live buffer (in which case the pool is left unchanged).
    pub fn reserve(
        &mut self,
        session: SessionId,
        nof_codeblocks: usize,
        is_new_data: bool,
    ) -> Result<&mut CombiningBuffer, Error> {
        if nof_codeblocks == 0 {
            return Err(Error::InvalidArgument(
                "Number of codeblocks cannot be zero".to_string(),
            ));
        }
        if nof_codeblocks > self.config.max_codeblocks {
            return Err(Error::CapacityExceeded {
                requested: nof_codeblocks,
                budget: self.config.max_codeblocks,
            });
        }

        if let Some(index) = self.live_index(session) {
            if !is_new_data {
                let stored = self.buffers[index].nof_codeblocks;
                if stored != nof_codeblocks {
                    return Err(Error::CodeblockCountMismatch {
                        declared: nof_codeblocks,
                        expected: stored,
                    });
                }
                let slot = self.current_slot;
                let buffer = &mut self.buffers[index];
                buffer.touch(slot);
                return Ok(buffer);
            }
            // New transmission on an existing buffer: growing it may push the pool over its
            // codeblock budget, so make room at the expense of the other buffers first.
            self.make_room_for_resize(session, nof_codeblocks);
            let slot = self.current_slot;
            let index = self
                .live_index(session)
                .expect("buffer kept during eviction");
            let buffer = &mut self.buffers[index];
            buffer.configure(nof_codeblocks);
            buffer.touch(slot);
            return Ok(buffer);
        }

        self.make_room_for_new(nof_codeblocks);
        let buffer = CombiningBuffer::new(
            session,
            nof_codeblocks,
            self.config.max_codeblock_size,
            self.current_slot,
        );
        self.buffers.push(buffer);
        Ok(self.buffers.last_mut().expect("buffer just pushed"))
    }

    /// Clears the CRC-pass flags of the buffer for the given session, leaving its soft bits
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if no live buffer exists for `session`.
    pub fn reset(&mut self, session: SessionId) -> Result<(), Error> {
        let index = self
            .live_index(session)
            .ok_or(Error::BufferNotFound(session))?;
        self.buffers[index].reset_codeblocks_crc();
        Ok(())
    }

    /// Returns the number of live (non-expired) buffers in the pool.
    #[must_use]
    pub fn nof_live_buffers(&self) -> usize {
        self.buffers
            .iter()
            .filter(|buffer| !buffer.is_expired(self.current_slot, self.config.expire_timeout_slots))
            .count()
    }

    /// Returns the total number of codeblocks across all live (non-expired) buffers.
    #[must_use]
    pub fn nof_live_codeblocks(&self) -> usize {
        self.buffers
            .iter()
            .filter(|buffer| !buffer.is_expired(self.current_slot, self.config.expire_timeout_slots))
            .map(|buffer| buffer.nof_codeblocks)
            .sum()
    }

    /// Returns the index of the live (non-expired) buffer for the given session, if any.
    fn live_index(&self, session: SessionId) -> Option<usize> {
        self.buffers.iter().position(|buffer| {
            buffer.session == session
                && !buffer.is_expired(self.current_slot, self.config.expire_timeout_slots)
        })
    }

    /// Reclaims expired buffers and evicts the least-recently-touched ones until a fresh buffer
    /// of `nof_codeblocks` codeblocks fits within the pool budgets.
    fn make_room_for_new(&mut self, nof_codeblocks: usize) {
        self.reclaim_expired();
        while self.buffers.len() >= self.config.max_buffers
            || self.total_codeblocks() + nof_codeblocks > self.config.max_codeblocks
        {
            self.evict_lru(None);
        }
    }

    /// Reclaims expired buffers and evicts the least-recently-touched ones (never the buffer
    /// for `keep`) until resizing the kept buffer to `nof_codeblocks` fits the codeblock budget.
    fn make_room_for_resize(&mut self, keep: SessionId, nof_codeblocks: usize) {
        self.reclaim_expired();
        loop {
            let kept = self
                .buffers
                .iter()
                .find(|buffer| buffer.session == keep)
                .map_or(0, |buffer| buffer.nof_codeblocks);
            if self.total_codeblocks() - kept + nof_codeblocks <= self.config.max_codeblocks {
                break;
            }
            self.evict_lru(Some(keep));
        }
    }

    /// Removes all expired buffers.
    fn reclaim_expired(&mut self) {
        let (current_slot, timeout) = (self.current_slot, self.config.expire_timeout_slots);
        self.buffers
            .retain(|buffer| !buffer.is_expired(current_slot, timeout));
    }

    /// Evicts the least-recently-touched buffer, skipping the one for `keep` (if given).
    fn evict_lru(&mut self, keep: Option<SessionId>) {
        let index = self
            .buffers
            .iter()
            .positions(|buffer| Some(buffer.session) != keep)
            .min_by_key(|&index| self.buffers[index].last_slot)
            .expect("pool cannot be emptied below a valid reservation");
        self.buffers.remove(index);
    }

    /// Returns the total number of codeblocks across all buffers, expired ones included.
    fn total_codeblocks(&self) -> usize {
        self.buffers
            .iter()
            .map(|buffer| buffer.nof_codeblocks)
            .sum()
    }
}

#[cfg(test)]
mod tests_of_buffer_pool {
    use float_eq::assert_float_eq;

    use super::*;

    fn pool_config() -> PoolConfig {
        PoolConfig {
            max_codeblock_size: 1000,
            max_buffers: 4,
            max_codeblocks: 16,
            expire_timeout_slots: 10,
        }
    }

    fn session(rnti: u16, harq_id: u8) -> SessionId {
        SessionId { rnti, harq_id }
    }

    #[test]
    fn test_new() {
        // Invalid input
        let mut config = pool_config();
        config.max_codeblock_size = 0;
        assert!(BufferPool::new(config).is_err());
        let mut config = pool_config();
        config.max_buffers = 0;
        assert!(BufferPool::new(config).is_err());
        let mut config = pool_config();
        config.max_codeblocks = 0;
        assert!(BufferPool::new(config).is_err());
        let mut config = pool_config();
        config.max_buffers = 20;
        assert!(BufferPool::new(config).is_err());
        // Valid input
        assert!(BufferPool::new(pool_config()).is_ok());
    }

    #[test]
    fn test_config_and_clock_accessors() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        assert_eq!(*pool.config(), pool_config());
        assert_eq!(pool.current_slot(), 0);
        pool.advance_slot();
        assert_eq!(pool.current_slot(), 1);
        pool.run_slot(7);
        assert_eq!(pool.current_slot(), 7);
    }

    #[test]
    fn test_reserve_allocates_then_reuses() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(5, 0);
        let buffer = pool.reserve(id, 4, true).unwrap();
        assert_eq!(buffer.nof_codeblocks(), 4);
        buffer.codeblock_soft_bits_mut(2)[7] = 3.5;
        // A retransmission with the same codeblock count must return the same buffer with its
        // accumulated soft bits intact.
        let buffer = pool.reserve(id, 4, false).unwrap();
        assert_float_eq!(buffer.codeblock_soft_bits(2)[7], 3.5, abs <= 1e-12);
        assert_eq!(pool.nof_live_buffers(), 1);
    }

    #[test]
    fn test_reserve_retransmission_count_mismatch() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(5, 0);
        pool.reserve(id, 4, true)
            .unwrap()
            .set_codeblock_crc(1, true);
        match pool.reserve(id, 5, false) {
            Err(crate::Error::CodeblockCountMismatch { declared, expected }) => {
                assert_eq!(declared, 5);
                assert_eq!(expected, 4);
            }
            other => panic!("expected CodeblockCountMismatch, got {other:?}"),
        }
        // The failed reservation must not have mutated the pool.
        let buffer = pool.reserve(id, 4, false).unwrap();
        assert_eq!(buffer.nof_codeblocks(), 4);
        assert!(buffer.codeblock_crc_ok(1));
    }

    #[test]
    fn test_reserve_new_data_clears_state() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(17, 3);
        let buffer = pool.reserve(id, 4, true).unwrap();
        buffer.codeblock_soft_bits_mut(0)[0] = -2.0;
        buffer.set_codeblock_crc(0, true);
        // A new transmission clears soft bits and CRC flags and may resize the buffer.
        let buffer = pool.reserve(id, 3, true).unwrap();
        assert_eq!(buffer.nof_codeblocks(), 3);
        assert!(!buffer.codeblock_crc_ok(0));
        assert_float_eq!(buffer.codeblock_soft_bits(0)[0], 0.0, abs <= 1e-12);
        assert_eq!(pool.nof_live_buffers(), 1);
    }

    #[test]
    fn test_reserve_codeblock_count_over_budget() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        assert!(matches!(
            pool.reserve(session(1, 0), 17, true),
            Err(crate::Error::CapacityExceeded {
                requested: 17,
                budget: 16
            })
        ));
        assert!(pool.reserve(session(1, 0), 0, true).is_err());
    }

    #[test]
    fn test_lru_eviction_under_capacity_pressure() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        for harq_id in 0 .. 4 {
            pool.reserve(session(1, harq_id), 4, true).unwrap();
            pool.advance_slot();
        }
        assert_eq!(pool.nof_live_buffers(), 4);
        assert_eq!(pool.nof_live_codeblocks(), 16);
        // Touch HARQ 0 so that HARQ 1 becomes the least-recently-used buffer.
        pool.reserve(session(1, 0), 4, false).unwrap();
        pool.advance_slot();
        pool.reserve(session(2, 0), 4, true).unwrap();
        assert_eq!(pool.nof_live_buffers(), 4);
        assert_eq!(pool.nof_live_codeblocks(), 16);
        assert!(pool.reset(session(1, 0)).is_ok());
        assert!(pool.reset(session(1, 1)).is_err());
    }

    #[test]
    fn test_capacity_invariant_over_reservation_sequence() {
        let config = pool_config();
        let mut pool = BufferPool::new(config).unwrap();
        // Pseudo-random walk over sessions and codeblock counts; the budgets must hold after
        // every reservation.
        let mut state = 1u64;
        for _ in 0 .. 200 {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let rnti = u16::try_from(state >> 48).unwrap() % 3;
            let harq_id = u8::try_from((state >> 32) & 0x7).unwrap();
            let nof_codeblocks = usize::try_from(1 + (state >> 16) % 16).unwrap();
            let _ = pool.reserve(session(rnti, harq_id), nof_codeblocks, true);
            assert!(pool.nof_live_buffers() <= config.max_buffers);
            assert!(pool.nof_live_codeblocks() <= config.max_codeblocks);
            if state % 5 == 0 {
                pool.advance_slot();
            }
        }
    }

    #[test]
    fn test_resize_evicts_other_buffers_when_growing() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        pool.reserve(session(1, 0), 8, true).unwrap();
        pool.advance_slot();
        pool.reserve(session(1, 1), 8, true).unwrap();
        pool.advance_slot();
        // Growing session (1, 1) to 16 codeblocks forces session (1, 0) out.
        let buffer = pool.reserve(session(1, 1), 16, true).unwrap();
        assert_eq!(buffer.nof_codeblocks(), 16);
        assert_eq!(pool.nof_live_buffers(), 1);
        assert_eq!(pool.nof_live_codeblocks(), 16);
    }

    #[test]
    fn test_expiration() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(9, 2);
        pool.reserve(id, 4, true)
            .unwrap()
            .codeblock_soft_bits_mut(0)[0] = 1.5;
        // Within the horizon the buffer still matches.
        pool.run_slot(10);
        let buffer = pool.reserve(id, 4, false).unwrap();
        assert_float_eq!(buffer.codeblock_soft_bits(0)[0], 1.5, abs <= 1e-12);
        // Beyond the horizon it is treated as absent: a retransmission gets a fresh buffer.
        pool.run_slot(21);
        assert!(pool.reset(id).is_err());
        let buffer = pool.reserve(id, 4, false).unwrap();
        assert_float_eq!(buffer.codeblock_soft_bits(0)[0], 0.0, abs <= 1e-12);
    }

    #[test]
    fn test_reset() {
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(5, 1);
        // Invalid input
        assert!(matches!(
            pool.reset(id),
            Err(crate::Error::BufferNotFound(_))
        ));
        // Valid input
        let buffer = pool.reserve(id, 2, true).unwrap();
        buffer.codeblock_soft_bits_mut(1)[3] = -0.5;
        buffer.set_codeblock_crc(0, true);
        buffer.set_codeblock_crc(1, true);
        pool.reset(id).unwrap();
        let buffer = pool.reserve(id, 2, false).unwrap();
        assert!(!buffer.codeblock_crc_ok(0));
        assert!(!buffer.codeblock_crc_ok(1));
        assert_float_eq!(buffer.codeblock_soft_bits(1)[3], -0.5, abs <= 1e-12);
    }

    #[test]
    fn test_scenario_from_pool_budget() {
        // Pool with max codeblock size 1000, max buffers 4, max codeblocks 16, expiration 10
        // slots; session (RNTI 5, HARQ 0).
        let mut pool = BufferPool::new(pool_config()).unwrap();
        let id = session(5, 0);
        let buffer = pool.reserve(id, 4, true).unwrap();
        assert_eq!(buffer.nof_codeblocks(), 4);
        buffer.codeblock_soft_bits_mut(0)[0] = 2.0;
        let buffer = pool.reserve(id, 4, false).unwrap();
        assert_float_eq!(buffer.codeblock_soft_bits(0)[0], 2.0, abs <= 1e-12);
        assert!(matches!(
            pool.reserve(id, 5, false),
            Err(crate::Error::CodeblockCountMismatch { .. })
        ));
    }
}
