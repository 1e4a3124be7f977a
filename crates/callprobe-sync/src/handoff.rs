//! Single-slot blocking handoff between one producer and one consumer.
//!
//! The session thread deposits each output value and the driver thread claims
//! it. At most one value is buffered: a second deposit blocks until the first
//! was claimed, so values reach the consumer in deposit order.
//!
//! A terminal fault (disconnect, session error) releases every waiter on
//! both sides. It is sticky: later deposits are rejected and every claim that
//! finds the slot empty fails with the fault.
//!
//! Interrupts are sticky too: an interrupt raised while nobody waits cancels
//! the next wait on that side.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};

use callprobe_core::{Error, Result, SessionFault};

use crate::interrupt::InterruptFlag;
use crate::wait::{lock, wait_limit, Deadline, Wake};

#[derive(Debug)]
struct State<T> {
    /// The buffered value
    slot: Option<T>,
    /// One-shot fault delivered to the next claim (interrupted deposit)
    undelivered: Option<SessionFault>,
    /// Sticky fault ending the exchange
    terminal: Option<SessionFault>,
}

/// Single-slot mailbox handing values from a producer to a consumer.
#[derive(Debug)]
pub struct HandoffBuffer<T> {
    state: Mutex<State<T>>,
    /// Signaled when the slot fills or a fault is recorded
    filled: Condvar,
    /// Signaled when the slot empties or a fault is recorded
    drained: Condvar,
    claim_interrupt: InterruptFlag,
    deposit_interrupt: InterruptFlag,
}

impl<T> HandoffBuffer<T> {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::with_claim_interrupt(InterruptFlag::new())
    }

    /// Create an empty buffer whose claims are cancelled by `interrupt`.
    ///
    /// Sharing one flag between several primitives lets a single request
    /// cancel whichever of them the consumer waits on next.
    pub fn with_claim_interrupt(interrupt: InterruptFlag) -> Self {
        Self {
            state: Mutex::new(State {
                slot: None,
                undelivered: None,
                terminal: None,
            }),
            filled: Condvar::new(),
            drained: Condvar::new(),
            claim_interrupt: interrupt,
            deposit_interrupt: InterruptFlag::new(),
        }
    }

    /// Store `value`, blocking until the previous value was claimed.
    ///
    /// Fails with [`Error::Session`] if the buffer was terminated (the value is
    /// dropped), or with [`Error::Interrupted`] if the producer was
    /// interrupted. An interrupted deposit leaves a
    /// [`SessionFault::ProducerInterrupted`] for the consumer instead of the
    /// value, so the consumer is not left waiting for it.
    pub fn deposit(&self, value: T) -> Result<()> {
        let mut state = lock(&self.state);
        loop {
            if self.deposit_interrupt.take() {
                warn!("Deposit interrupted");
                if state.undelivered.is_none() && state.terminal.is_none() {
                    state.undelivered = Some(SessionFault::ProducerInterrupted);
                }
                self.filled.notify_one();
                return Err(Error::Interrupted);
            }

            if let Some(fault) = &state.terminal {
                debug!("Handoff terminated, rejecting deposit: {}", fault);
                return Err(Error::Session(fault.clone()));
            }

            if state.slot.is_none() && state.undelivered.is_none() {
                state.slot = Some(value);
                trace!("Handoff slot filled");
                self.filled.notify_one();
                return Ok(());
            }

            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take the next value, waiting indefinitely.
    pub fn claim(&self) -> Result<T> {
        self.claim_within(None)
    }

    /// Take the next value, waiting at most `timeout` (zero waits indefinitely).
    pub fn claim_timeout(&self, timeout: Duration) -> Result<T> {
        self.claim_within(wait_limit(timeout))
    }

    /// Take the next value, waiting at most `limit` (`None` waits indefinitely).
    ///
    /// A buffered value is always returned before a terminal fault, so output
    /// deposited just before a disconnect is not lost. A pending interrupt
    /// fails the claim first and leaves any buffered value in place. On
    /// timeout the buffer is left untouched.
    pub fn claim_within(&self, limit: Option<Duration>) -> Result<T> {
        let deadline = Deadline::after(limit);
        let mut state = lock(&self.state);
        loop {
            if self.claim_interrupt.take() {
                debug!("Claim interrupted");
                return Err(Error::Interrupted);
            }

            if let Some(value) = state.slot.take() {
                trace!("Handoff slot claimed");
                self.drained.notify_one();
                return Ok(value);
            }

            if let Some(fault) = state.undelivered.take() {
                self.drained.notify_one();
                return Err(Error::Session(fault));
            }

            if let Some(fault) = &state.terminal {
                return Err(Error::Session(fault.clone()));
            }

            match deadline.wait(&self.filled, state) {
                Wake::Woken(woken) => state = woken,
                Wake::Expired(_) => {
                    debug!("Claim timed out after {:?}", limit);
                    return Err(Error::WaitTimeout(limit.unwrap_or_default()));
                }
            }
        }
    }

    /// Record a terminal fault and wake every waiter.
    ///
    /// The first fault wins; later ones are ignored.
    pub fn signal_terminal(&self, fault: SessionFault) {
        let mut state = lock(&self.state);
        if state.terminal.is_none() {
            debug!("Handoff terminal signal: {}", fault);
            state.terminal = Some(fault);
        }
        self.filled.notify_all();
        self.drained.notify_all();
    }

    /// Interrupt the blocked claim, or the next claim if none is blocked.
    pub fn interrupt_claim(&self) {
        self.claim_interrupt.raise();
        // Taking the lock orders the notification after the claimant's check
        let _state = lock(&self.state);
        self.filled.notify_all();
    }

    /// Interrupt the blocked deposit, or the next deposit if none is blocked.
    pub fn interrupt_deposit(&self) {
        self.deposit_interrupt.raise();
        let _state = lock(&self.state);
        self.drained.notify_all();
    }

    /// Whether a value is waiting to be claimed.
    pub fn is_full(&self) -> bool {
        lock(&self.state).slot.is_some()
    }

    /// The terminal fault, if one was recorded.
    pub fn terminal_fault(&self) -> Option<SessionFault> {
        lock(&self.state).terminal.clone()
    }
}

impl<T> Default for HandoffBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_deposit_before_claim_is_kept() {
        let buffer = HandoffBuffer::new();
        buffer.deposit("hello").unwrap();
        assert!(buffer.is_full());
        assert_eq!(buffer.claim().unwrap(), "hello");
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_claim_timeout_leaves_buffer_claimable() {
        let buffer = Arc::new(HandoffBuffer::new());
        let start = Instant::now();
        let err = buffer.claim_timeout(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, Error::WaitTimeout(d) if d == Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || producer.deposit(7).unwrap());
        assert_eq!(buffer.claim_timeout(Duration::from_secs(5)).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn test_second_deposit_blocks_until_claim() {
        let buffer = Arc::new(HandoffBuffer::new());
        buffer.deposit(1).unwrap();

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            producer.deposit(2).unwrap();
            Instant::now()
        });

        thread::sleep(Duration::from_millis(50));
        let claimed_at = Instant::now();
        assert_eq!(buffer.claim().unwrap(), 1);
        let deposited_at = handle.join().unwrap();
        assert!(deposited_at >= claimed_at);
        assert_eq!(buffer.claim().unwrap(), 2);
    }

    #[test]
    fn test_terminal_releases_blocked_claim() {
        let buffer: Arc<HandoffBuffer<u32>> = Arc::new(HandoffBuffer::new());
        let consumer = Arc::clone(&buffer);
        let handle = thread::spawn(move || consumer.claim());

        thread::sleep(Duration::from_millis(50));
        buffer.signal_terminal(SessionFault::Disconnected);

        let result = handle.join().unwrap();
        assert!(matches!(
            result,
            Err(Error::Session(SessionFault::Disconnected))
        ));
    }

    #[test]
    fn test_terminal_is_sticky_and_rejects_deposits() {
        let buffer = HandoffBuffer::new();
        buffer.signal_terminal(SessionFault::Disconnected);
        buffer.signal_terminal(SessionFault::HungUp);

        assert!(matches!(
            buffer.deposit("late"),
            Err(Error::Session(SessionFault::Disconnected))
        ));
        for _ in 0..2 {
            assert!(matches!(
                buffer.claim_timeout(Duration::from_secs(5)),
                Err(Error::Session(SessionFault::Disconnected))
            ));
        }
        assert_eq!(buffer.terminal_fault(), Some(SessionFault::Disconnected));
    }

    #[test]
    fn test_value_buffered_before_terminal_is_delivered_first() {
        let buffer = HandoffBuffer::new();
        buffer.deposit("Goodbye!").unwrap();
        buffer.signal_terminal(SessionFault::Disconnected);

        assert_eq!(buffer.claim().unwrap(), "Goodbye!");
        assert!(matches!(buffer.claim(), Err(Error::Session(_))));
    }

    #[test]
    fn test_terminal_releases_blocked_deposit() {
        let buffer = Arc::new(HandoffBuffer::new());
        buffer.deposit(1).unwrap();

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || producer.deposit(2));

        thread::sleep(Duration::from_millis(50));
        buffer.signal_terminal(SessionFault::HungUp);
        assert!(matches!(
            handle.join().unwrap(),
            Err(Error::Session(SessionFault::HungUp))
        ));
    }

    #[test]
    fn test_terminal_wins_over_expiring_timeout() {
        let buffer: Arc<HandoffBuffer<u32>> = Arc::new(HandoffBuffer::new());
        let consumer = Arc::clone(&buffer);
        let handle = thread::spawn(move || consumer.claim_timeout(Duration::from_millis(100)));

        buffer.signal_terminal(SessionFault::Disconnected);
        assert!(matches!(
            handle.join().unwrap(),
            Err(Error::Session(SessionFault::Disconnected))
        ));
    }

    #[test]
    fn test_interrupt_claim() {
        let buffer: Arc<HandoffBuffer<u32>> = Arc::new(HandoffBuffer::new());
        let consumer = Arc::clone(&buffer);
        let handle = thread::spawn(move || consumer.claim());

        thread::sleep(Duration::from_millis(20));
        buffer.interrupt_claim();
        assert!(matches!(handle.join().unwrap(), Err(Error::Interrupted)));

        // The interrupt is consumed; the buffer keeps working
        buffer.deposit(3).unwrap();
        assert_eq!(buffer.claim().unwrap(), 3);
    }

    #[test]
    fn test_interrupt_before_claim_fails_next_claim() {
        let buffer: HandoffBuffer<u32> = HandoffBuffer::new();
        buffer.interrupt_claim();

        let start = Instant::now();
        assert!(matches!(buffer.claim(), Err(Error::Interrupted)));
        assert!(start.elapsed() < Duration::from_secs(1));

        // One interrupt cancels one claim
        assert!(matches!(
            buffer.claim_timeout(Duration::from_millis(20)),
            Err(Error::WaitTimeout(_))
        ));
    }

    #[test]
    fn test_pending_interrupt_keeps_buffered_value() {
        let buffer = HandoffBuffer::new();
        buffer.deposit(9).unwrap();
        buffer.interrupt_claim();

        assert!(matches!(buffer.claim(), Err(Error::Interrupted)));
        assert_eq!(buffer.claim().unwrap(), 9);
    }

    #[test]
    fn test_shared_flag_cancels_one_wait() {
        let flag = InterruptFlag::new();
        let first: HandoffBuffer<u32> = HandoffBuffer::with_claim_interrupt(flag.clone());
        let second: HandoffBuffer<u32> = HandoffBuffer::with_claim_interrupt(flag.clone());

        first.interrupt_claim();
        assert!(matches!(second.claim(), Err(Error::Interrupted)));
        assert!(!flag.is_raised());
        assert!(matches!(
            first.claim_timeout(Duration::from_millis(20)),
            Err(Error::WaitTimeout(_))
        ));
    }

    #[test]
    fn test_interrupted_deposit_reaches_consumer() {
        let buffer = Arc::new(HandoffBuffer::new());
        buffer.deposit(1).unwrap();

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || producer.deposit(2));

        thread::sleep(Duration::from_millis(20));
        buffer.interrupt_deposit();
        assert!(matches!(handle.join().unwrap(), Err(Error::Interrupted)));

        assert_eq!(buffer.claim().unwrap(), 1);
        assert!(matches!(
            buffer.claim_timeout(Duration::from_secs(5)),
            Err(Error::Session(SessionFault::ProducerInterrupted))
        ));

        // Not terminal: the next deposit goes through
        buffer.deposit(4).unwrap();
        assert_eq!(buffer.claim().unwrap(), 4);
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let buffer = HandoffBuffer::new();
        buffer.deposit("ready").unwrap();
        assert_eq!(buffer.claim_timeout(Duration::MAX).unwrap(), "ready");

        buffer.signal_terminal(SessionFault::Disconnected);
        assert!(matches!(
            buffer.claim_timeout(Duration::MAX),
            Err(Error::Session(SessionFault::Disconnected))
        ));
    }
}
