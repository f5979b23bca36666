use std::collections::VecDeque;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use pac_bootctl_common::Tier;

/// External probes (C7): small, pure-at-interface procedures the policy
/// evaluator consults. Every call is time-bounded — no guard may block
/// indefinitely.
pub trait Probes: Send + Sync {
    /// One probe of the verifier with a bounded timeout.
    fn verifier_reachable(&self, timeout: Duration) -> bool;

    /// Probes a target host at a fixed interval for `window`. True only if
    /// every probe in the window succeeds.
    fn network_stable_for(&self, window: Duration, poll_interval: Duration) -> bool;

    /// Filesystem existence check of the tier-specific root image.
    fn tier_root_present(&self, tier: Tier) -> bool;
}

/// Production probe implementation. The verifier service, network target,
/// and tier-root mounts are external collaborators per this system's scope;
/// this is a thin, honestly-bounded client for them, not a reimplementation.
pub struct RealProbes {
    pub verifier_addr: String,
    pub network_target_addr: String,
    pub tier_root_paths: Vec<(Tier, PathBuf)>,
}

impl RealProbes {
    fn tcp_probe(addr: &str, timeout: Duration) -> bool {
        let resolved = match addr.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(_) => None,
        };
        match resolved {
            Some(sock_addr) => TcpStream::connect_timeout(&sock_addr, timeout).is_ok(),
            None => false,
        }
    }
}

impl Probes for RealProbes {
    fn verifier_reachable(&self, timeout: Duration) -> bool {
        Self::tcp_probe(&self.verifier_addr, timeout)
    }

    fn network_stable_for(&self, window: Duration, poll_interval: Duration) -> bool {
        let deadline = std::time::Instant::now() + window;
        loop {
            if !Self::tcp_probe(&self.network_target_addr, poll_interval) {
                return false;
            }
            if std::time::Instant::now() >= deadline {
                return true;
            }
            thread::sleep(poll_interval);
        }
    }

    fn tier_root_present(&self, tier: Tier) -> bool {
        self.tier_root_paths
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, path)| path.exists())
            .unwrap_or(false)
    }
}

/// Scriptable probe stand-in for tests: each probe type pops a
/// pre-programmed answer from its own queue, repeating the last answer once
/// the queue is drained.
pub struct FakeProbes {
    verifier: Mutex<VecDeque<bool>>,
    network: Mutex<VecDeque<bool>>,
    tier_roots: Mutex<Vec<(Tier, bool)>>,
}

impl FakeProbes {
    pub fn new() -> Self {
        Self {
            verifier: Mutex::new(VecDeque::new()),
            network: Mutex::new(VecDeque::new()),
            tier_roots: Mutex::new(Vec::new()),
        }
    }

    pub fn with_verifier_sequence(self, seq: impl IntoIterator<Item = bool>) -> Self {
        *self.verifier.lock().unwrap() = seq.into_iter().collect();
        self
    }

    pub fn with_network_sequence(self, seq: impl IntoIterator<Item = bool>) -> Self {
        *self.network.lock().unwrap() = seq.into_iter().collect();
        self
    }

    pub fn with_tier_root(self, tier: Tier, present: bool) -> Self {
        self.tier_roots.lock().unwrap().push((tier, present));
        self
    }

    fn pop_or_last(queue: &Mutex<VecDeque<bool>>, default: bool) -> bool {
        let mut q = queue.lock().unwrap();
        if q.len() > 1 {
            q.pop_front().unwrap_or(default)
        } else {
            q.front().copied().unwrap_or(default)
        }
    }
}

impl Default for FakeProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl Probes for FakeProbes {
    fn verifier_reachable(&self, _timeout: Duration) -> bool {
        Self::pop_or_last(&self.verifier, true)
    }

    fn network_stable_for(&self, _window: Duration, _poll_interval: Duration) -> bool {
        Self::pop_or_last(&self.network, true)
    }

    fn tier_root_present(&self, tier: Tier) -> bool {
        self.tier_roots
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, present)| *present)
            .unwrap_or(true)
    }
}
