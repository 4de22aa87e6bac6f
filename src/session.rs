//! Decode-session facade and the owned dispatcher context
//!
//! A [`DecodeSession`] combines one handle store of buffer pools with the external decode
//! engine and implements the four session operations. [`DecoderContext`] is the explicitly
//! owned object standing in for the host environment's single-instance-per-call-site model: it
//! registers the operations with a [`Dispatcher`](crate::Dispatcher) under their action names
//! and routes [`Request`] values to them; dropping the context releases every stored pool.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatcher;
use crate::engine::{DecodeConfig, DecodeEngine, DecodeOutput};
use crate::ldpc::{self, BaseGraph};
use crate::pool::{BufferPool, PoolConfig, SessionId};
use crate::store::{Handle, HandleStore};
use crate::Error;

/// Segmentation description of one transport block
#[derive(Clone, Eq, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SegmentConfig {
    /// LDPC base graph selected for the transmission
    pub base_graph: BaseGraph,
    /// Transport-block size in bits
    pub tbs_bits: usize,
    /// Decoder iteration budget per codeblock
    pub max_iterations: u32,
}

/// Buffer identity declared by the caller: session identifier plus codeblock count
#[derive(Clone, Eq, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct BufferRequest {
    /// Session identifier of the combining stream
    pub session: SessionId,
    /// Number of codeblocks forming the codeword
    pub nof_codeblocks: usize,
}

/// Decoding statistics for one codeword
#[derive(Clone, PartialEq, Debug, Copy, Serialize)]
pub struct DecodeStats {
    /// `true` if every codeblock of the transport block passed its CRC
    pub tb_crc_ok: bool,
    /// Maximum number of decoder iterations across all codeblocks
    pub iterations_max: u32,
    /// Average number of decoder iterations across all codeblocks
    pub iterations_mean: f64,
}

impl DecodeStats {
    /// Aggregates the per-codeblock engine outcome into codeword statistics.
    #[allow(clippy::cast_precision_loss)]
    fn from_output(output: &DecodeOutput) -> Self {
        let nof_codeblocks = output.iterations.len().max(1);
        Self {
            tb_crc_ok: output.codeblock_crc_ok.iter().all(|&ok| ok),
            iterations_max: output.iterations.iter().copied().max().unwrap_or(0),
            iterations_mean: output.iterations.iter().sum::<u32>() as f64
                / nof_codeblocks as f64,
        }
    }
}

/// Per-decoder-instance session state: a store of buffer pools plus the decode engine
#[derive(Debug)]
pub struct DecodeSession {
    /// Pools created by `new` calls, owned until released
    store: HandleStore<BufferPool>,
    /// The external decode engine
    engine: Box<dyn DecodeEngine>,
}

impl DecodeSession {
    /// Returns a session around the given decode engine.
    #[must_use]
    pub fn new(engine: Box<dyn DecodeEngine>) -> Self {
        Self {
            store: HandleStore::new(),
            engine,
        }
    }

    /// Constructs a buffer pool with the given configuration and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be constructed from `config`.
    pub fn create_pool(&mut self, config: PoolConfig) -> Result<Handle, Error> {
        let pool = BufferPool::new(config)
            .map_err(|error| Error::ResourceCreationFailed(error.to_string()))?;
        Ok(self.store.store(pool))
    }

    /// Decodes one codeword against the combining buffer of the requested session.
    ///
    /// Resolves `handle`, cross-checks the caller-declared codeblock count against the count
    /// implied by the segmentation (independently of the pool, as a defense against a
    /// disagreement between caller and segmenter), advances the pool clock by one slot,
    /// reserves the combining buffer, and invokes the decode engine synchronously.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport-block size is not an exact number of bytes, if the
    /// handle is unknown, if the declared codeblock count disagrees with the segmentation or
    /// with the live buffer, or if the reservation or the engine fails.
    pub fn step(
        &mut self,
        handle: Handle,
        llrs: &[f64],
        is_new_data: bool,
        segment: &SegmentConfig,
        request: &BufferRequest,
    ) -> Result<(Vec<u8>, DecodeStats), Error> {
        if segment.tbs_bits == 0 || segment.tbs_bits % 8 != 0 {
            return Err(Error::InvalidArgument(format!(
                "The transport-block size ({} bits) is not an exact number of bytes",
                segment.tbs_bits
            )));
        }
        let expected = ldpc::expected_codeblocks(segment.tbs_bits, segment.base_graph);
        if request.nof_codeblocks != expected {
            return Err(Error::CodeblockCountMismatch {
                declared: request.nof_codeblocks,
                expected,
            });
        }
        let pool = self
            .store
            .get_mut(handle)
            .ok_or(Error::UnknownHandle(handle.raw()))?;
        // One invocation models one slot of the pool clock.
        pool.advance_slot();
        let buffer = pool.reserve(request.session, request.nof_codeblocks, is_new_data)?;
        let config = DecodeConfig {
            tbs_bits: segment.tbs_bits,
            max_iterations: segment.max_iterations,
        };
        let output = self.engine.decode(llrs, buffer, &config)?;
        let stats = DecodeStats::from_output(&output);
        Ok((output.transport_block, stats))
    }

    /// Clears the per-codeblock CRC flags of one combining buffer without decoding.
    ///
    /// Only the session identifier of `request` names the buffer; no reservation takes place,
    /// so the declared codeblock count is not checked and no buffer is allocated when the
    /// session is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is unknown or if no live buffer exists for the session.
    pub fn reset_crcs(&mut self, handle: Handle, request: &BufferRequest) -> Result<(), Error> {
        let pool = self
            .store
            .get_mut(handle)
            .ok_or(Error::UnknownHandle(handle.raw()))?;
        pool.reset(request.session)
    }

    /// Releases the buffer pool named by `handle`, invalidating the handle.
    ///
    /// Returns the number of released pools: 1 if the handle was live, 0 otherwise.
    pub fn release(&mut self, handle: Handle) -> u32 {
        self.store.release(handle)
    }

    /// Returns the number of live buffer pools.
    #[must_use]
    pub fn nof_pools(&self) -> usize {
        self.store.len()
    }
}

/// Arguments of one dispatched call
#[derive(Clone, PartialEq, Debug)]
pub enum Request {
    /// Arguments of the `new` action
    New {
        /// Configuration of the buffer pool to create
        config: PoolConfig,
    },
    /// Arguments of the `step` action
    Step {
        /// Handle of the buffer pool
        handle: Handle,
        /// Codeword log-likelihood ratios
        llrs: Vec<f64>,
        /// `true` for a new transmission, `false` for a HARQ retransmission
        is_new_data: bool,
        /// Segmentation description of the transport block
        segment: SegmentConfig,
        /// Buffer identity declared by the caller
        request: BufferRequest,
    },
    /// Arguments of the `reset_crcs` action
    ResetCrcs {
        /// Handle of the buffer pool
        handle: Handle,
        /// Buffer identity declared by the caller
        request: BufferRequest,
    },
    /// Arguments of the `release` action
    Release {
        /// Handle of the buffer pool
        handle: Handle,
    },
}

/// Results of one dispatched call
#[derive(Clone, PartialEq, Debug)]
pub enum Reply {
    /// Handle of a freshly created buffer pool
    PoolHandle(Handle),
    /// Decoded transport block and codeword statistics
    Decoded {
        /// Decoded transport block, packed MSB first
        transport_block: Vec<u8>,
        /// Codeword statistics
        stats: DecodeStats,
    },
    /// CRC flags cleared
    Reset,
    /// Number of pools released (0 or 1)
    Released(u32),
}

/// Returns the error reported when an action receives the wrong request variant.
fn wrong_request(action: &str) -> Error {
    Error::InvalidArgument(format!("Wrong arguments for action '{action}'"))
}

/// Explicitly owned process context: one decode session behind a command dispatcher
///
/// # Examples
///
/// ```
/// use harqpool::{ChaseDecoder, DecoderContext, PoolConfig, Reply, Request};
///
/// let mut context = DecoderContext::new(Box::new(ChaseDecoder))?;
/// let config = PoolConfig {
///     max_codeblock_size: 1000,
///     max_buffers: 4,
///     max_codeblocks: 16,
///     expire_timeout_slots: 10,
/// };
/// let Reply::PoolHandle(handle) = context.call("new", Request::New { config })? else {
///     unreachable!()
/// };
/// assert_eq!(
///     context.call("release", Request::Release { handle })?,
///     Reply::Released(1)
/// );
/// # Ok::<(), harqpool::Error>(())
/// ```
#[derive(Debug)]
pub struct DecoderContext {
    /// Router holding the four registered actions
    dispatcher: Dispatcher<Request, Reply>,
}

impl DecoderContext {
    /// Returns a context with the four session operations registered under their action names.
    ///
    /// # Errors
    ///
    /// Returns an error if an action name is registered twice, which cannot happen with the
    /// fixed set installed here.
    pub fn new(engine: Box<dyn DecodeEngine>) -> Result<Self, Error> {
        let session = Rc::new(RefCell::new(DecodeSession::new(engine)));
        let mut dispatcher = Dispatcher::new();

        let shared = Rc::clone(&session);
        dispatcher.register(
            "new",
            Box::new(move |request| match request {
                Request::New { config } => {
                    Ok(Reply::PoolHandle(shared.borrow_mut().create_pool(config)?))
                }
                _ => Err(wrong_request("new")),
            }),
        )?;

        let shared = Rc::clone(&session);
        dispatcher.register(
            "step",
            Box::new(move |request| match request {
                Request::Step {
                    handle,
                    llrs,
                    is_new_data,
                    segment,
                    request,
                } => {
                    let (transport_block, stats) = shared.borrow_mut().step(
                        handle,
                        &llrs,
                        is_new_data,
                        &segment,
                        &request,
                    )?;
                    Ok(Reply::Decoded {
                        transport_block,
                        stats,
                    })
                }
                _ => Err(wrong_request("step")),
            }),
        )?;

        let shared = Rc::clone(&session);
        dispatcher.register(
            "reset_crcs",
            Box::new(move |request| match request {
                Request::ResetCrcs { handle, request } => {
                    shared.borrow_mut().reset_crcs(handle, &request)?;
                    Ok(Reply::Reset)
                }
                _ => Err(wrong_request("reset_crcs")),
            }),
        )?;

        let shared = Rc::clone(&session);
        dispatcher.register(
            "release",
            Box::new(move |request| match request {
                Request::Release { handle } => {
                    Ok(Reply::Released(shared.borrow_mut().release(handle)))
                }
                _ => Err(wrong_request("release")),
            }),
        )?;

        Ok(Self { dispatcher })
    }

    /// Invokes the action registered under `action` with the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is unknown, if the request variant does not match the
    /// action, or whatever error the operation itself produces.
    pub fn call(&mut self, action: &str, request: Request) -> Result<Reply, Error> {
        self.dispatcher.dispatch(action, request)
    }
}
