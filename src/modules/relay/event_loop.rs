//! Readiness-driven event loop.
//!
//! One thread owns the watch set, the listener and every session. Each
//! iteration waits for readiness, then services each ready handle once in
//! ascending token order: the listener accepts one client, a session handle
//! gets one relay step. Nothing here runs concurrently.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};
use tracing::{debug, info, trace, warn};

use super::config::RelayConfig;
use super::error::{RelayError, RelayResult};
use super::forward::{Passthrough, PayloadHook, Relay, StepOutcome};
use super::listener::{AcceptOutcome, Listener, LISTENER_TOKEN};
use super::stats::RelayStats;
use super::table::SessionTable;

/// Watch-set token of the stop waker.
pub const WAKER_TOKEN: Token = Token(usize::MAX);

/// Cloneable handle that asks a running [`EventLoop`] to stop.
///
/// Stopping sets a flag and wakes the readiness wait, so an idle loop notices
/// right away instead of on the next network event.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl StopHandle {
    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake event loop");
        }
    }

    /// Returns `true` once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// The relay engine.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: Listener,
    table: SessionTable,
    relay: Relay,
    stats: Arc<RelayStats>,
    stop: StopHandle,

    /// Ready tokens of the current iteration, reused across iterations.
    ready: Vec<Token>,
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("local_addr", &self.listener.local_addr())
            .field("sessions", &self.table.len())
            .field("relay", &self.relay)
            .finish()
    }
}

impl EventLoop {
    /// Bind the listener and build a loop that forwards bytes unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the watch set
    /// cannot be created. No loop exists in that case.
    pub fn bind(config: &RelayConfig) -> RelayResult<Self> {
        Self::with_hook(config, Box::new(Passthrough))
    }

    /// Bind the listener and build a loop that runs `hook` over every chunk.
    pub fn with_hook(config: &RelayConfig, hook: Box<dyn PayloadHook>) -> RelayResult<Self> {
        let poll = Poll::new().map_err(RelayError::Poll)?;
        let mut listener = Listener::bind(config)?;
        listener.register(poll.registry())?;

        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(RelayError::Registration)?;
        let stats = Arc::new(RelayStats::new());

        Ok(Self {
            poll,
            events: Events::with_capacity(config.events_capacity.max(1)),
            listener,
            table: SessionTable::new(),
            relay: Relay::with_hook(config.buffer_size, Arc::clone(&stats), hook),
            stats,
            stop: StopHandle {
                stopped: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
            ready: Vec::new(),
        })
    }

    /// Get the bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.table.len()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// A handle that stops this loop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run one iteration: wait up to `timeout` (forever if `None`) and service
    /// every ready handle once. Returns how many handles were serviced.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Poll`] if the wait fails for any reason other
    /// than an interrupt. Nothing is serviced in that case.
    pub fn turn(&mut self, timeout: Option<Duration>) -> RelayResult<usize> {
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                debug!("Readiness wait interrupted");
                return Ok(0);
            }
            return Err(RelayError::Poll(e));
        }

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        ready.extend(
            self.events
                .iter()
                .map(|event| event.token())
                .filter(|&token| token != WAKER_TOKEN),
        );
        ready.sort_unstable();
        ready.dedup();

        for &token in &ready {
            if token == LISTENER_TOKEN {
                self.accept();
            } else {
                self.relay_step(token);
            }
        }

        let serviced = ready.len();
        self.ready = ready;
        Ok(serviced)
    }

    /// Run until stopped, then tear down every session and close the listener.
    pub fn run(mut self) {
        info!(
            address = %self.listener.local_addr(),
            upstream = %self.listener.upstream_target(),
            buffer_size = self.relay.buffer_size(),
            "TCP relay event loop started"
        );

        while !self.stop.is_stopped() {
            if let Err(e) = self.turn(None) {
                self.stats.poll_error();
                warn!(error = %e, "Event loop iteration failed");
            }
        }

        self.shutdown();
    }

    fn accept(&mut self) {
        match self.listener.accept(&mut self.table, self.poll.registry()) {
            AcceptOutcome::Established(_) => self.stats.session_opened(),
            AcceptOutcome::Rejected { .. } => self.stats.upstream_failure(),
            AcceptOutcome::Failed(_) => self.stats.accept_error(),
            AcceptOutcome::Idle => trace!("Spurious listener readiness"),
        }
    }

    fn relay_step(&mut self, token: Token) {
        let Some((id, direction)) = self.table.resolve(token) else {
            trace!(token = token.0, "Readiness for a handle with no session");
            return;
        };

        match self
            .relay
            .step(&mut self.table, self.poll.registry(), id, direction)
        {
            StepOutcome::Forwarded(_) | StepOutcome::Idle | StepOutcome::Stale => {},
            StepOutcome::Closed => debug!(session = id, "Session closed by peer"),
            StepOutcome::Failed(e) => debug!(session = id, error = %e, "Session failed"),
        }
    }

    fn shutdown(self) {
        let Self {
            poll,
            mut listener,
            mut table,
            stats,
            ..
        } = self;

        let swept = table.teardown_all(poll.registry());
        for _ in 0..swept {
            stats.session_swept();
        }

        if let Err(e) = listener.deregister(poll.registry()) {
            debug!(error = %e, "Failed to deregister listener");
        }
        let address = listener.local_addr();
        drop(listener);

        info!(address = %address, sessions = swept, "TCP relay event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{IpAddr, Ipv4Addr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};

    const TICK: Option<Duration> = Some(Duration::from_millis(10));

    fn local_config(upstream_port: u16) -> RelayConfig {
        RelayConfig::new(0, "127.0.0.1", upstream_port)
            .with_listen_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn drive_until(event_loop: &mut EventLoop, mut done: impl FnMut(&EventLoop) -> bool) -> bool {
        for _ in 0..500 {
            event_loop.turn(TICK).unwrap();
            if done(event_loop) {
                return true;
            }
        }
        false
    }

    fn assert_closed(stream: &mut StdTcpStream) {
        let mut buf = [0u8; 8];
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
        }
    }

    #[test]
    fn test_bind_reports_local_addr() {
        let event_loop = EventLoop::bind(&local_config(443)).unwrap();
        assert_eq!(event_loop.local_addr().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_ne!(event_loop.local_addr().port(), 0);
        assert_eq!(event_loop.session_count(), 0);
    }

    #[test]
    fn test_bind_failure() {
        let first = EventLoop::bind(&local_config(443)).unwrap();
        let mut config = local_config(443);
        config.listen_port = first.local_addr().port();

        let err = EventLoop::bind(&config).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_idle_turn_services_nothing() {
        let mut event_loop = EventLoop::bind(&local_config(443)).unwrap();
        assert_eq!(event_loop.turn(TICK).unwrap(), 0);
    }

    #[test]
    fn test_round_trip() {
        let upstream = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let mut event_loop =
            EventLoop::bind(&local_config(upstream.local_addr().unwrap().port())).unwrap();

        let mut client = StdTcpStream::connect(event_loop.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert!(drive_until(&mut event_loop, |l| l.session_count() == 1));

        let (mut target, _) = upstream.accept().unwrap();
        target
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        client.write_all(b"PING").unwrap();
        let stats = event_loop.stats();
        assert!(drive_until(&mut event_loop, |_| stats.total_bytes_to_upstream() == 4));
        let mut buf = [0u8; 4];
        target.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"PING");

        target.write_all(b"PONG").unwrap();
        assert!(drive_until(&mut event_loop, |_| stats.total_bytes_to_downstream() == 4));
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"PONG");

        assert_eq!(stats.total_sessions(), 1);
        assert_eq!(stats.active_sessions(), 1);
    }

    #[test]
    fn test_unreachable_upstream_rejects_client() {
        let dead_port = {
            let probe = StdTcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut event_loop = EventLoop::bind(&local_config(dead_port)).unwrap();
        let stats = event_loop.stats();

        let mut client = StdTcpStream::connect(event_loop.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        assert!(drive_until(&mut event_loop, |_| stats.total_upstream_failures() == 1));
        assert_eq!(event_loop.session_count(), 0);
        assert_eq!(stats.total_sessions(), 0);
        assert_closed(&mut client);
    }

    #[test]
    fn test_stop_wakes_idle_loop() {
        let event_loop = EventLoop::bind(&local_config(443)).unwrap();
        let stop = event_loop.stop_handle();

        let worker = std::thread::spawn(move || event_loop.run());
        std::thread::sleep(Duration::from_millis(50));
        stop.stop();
        stop.stop();

        worker.join().unwrap();
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_shutdown_tears_down_sessions() {
        let upstream = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let mut event_loop =
            EventLoop::bind(&local_config(upstream.local_addr().unwrap().port())).unwrap();
        let stats = event_loop.stats();

        let mut client = StdTcpStream::connect(event_loop.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert!(drive_until(&mut event_loop, |l| l.session_count() == 1));
        let (mut target, _) = upstream.accept().unwrap();
        target
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        event_loop.stop_handle().stop();
        event_loop.run();

        assert_eq!(stats.active_sessions(), 0);
        assert_closed(&mut client);
        assert_closed(&mut target);
    }
}
