use rustc_hash::FxHashMap;
use tracing::debug;

/// Width of the sliding send window: packet `N` may not be sent while packet `N - 256` is
///  still unacknowledged.
pub const SEND_WINDOW: u32 = 256;

/// The payloads of recently sent packets, kept until the peer acknowledges them so resend
///  requests can be served from here.
///
/// Two integer bounds track the lowest and highest sequence number still cached. Invariants:
/// * both bounds are `None` exactly when the cache is empty
/// * when non-empty, both bounds are members of the cache, and every member lies in
///   `[lowest, highest]`
///
/// Sequence numbers are non-wrapping within a session; wrap-around is the session owner's
///  problem (a session never lives long enough for 2^32 packets).
#[derive(Debug, Default)]
pub struct RetransmitCache {
    packets: FxHashMap<u32, Vec<u8>>,
    lowest: Option<u32>,
    highest: Option<u32>,
}

impl RetransmitCache {
    pub fn new() -> RetransmitCache {
        RetransmitCache::default()
    }

    pub fn insert(&mut self, seq: u32, payload: Vec<u8>) {
        self.packets.insert(seq, payload);
        self.lowest = Some(self.lowest.map_or(seq, |l| l.min(seq)));
        self.highest = Some(self.highest.map_or(seq, |h| h.max(seq)));
    }

    /// Remove a cached payload, e.g. because it was acknowledged. Returns whether the
    ///  sequence number was actually cached.
    pub fn remove(&mut self, seq: u32) -> bool {
        if self.packets.remove(&seq).is_none() {
            return false;
        }
        if self.packets.is_empty() {
            self.lowest = None;
            self.highest = None;
            return true;
        }

        let mut low = self.lowest.expect("non-empty cache must have a lower bound");
        let mut high = self.highest.expect("non-empty cache must have an upper bound");

        // advance the bounds past non-members until they sit on members again
        if seq == low {
            loop {
                low = low
                    .checked_add(1)
                    .filter(|l| *l <= high)
                    .expect("this is a bug: no cached packet between the cache bounds");
                if self.packets.contains_key(&low) {
                    break;
                }
            }
        }
        if seq == high {
            loop {
                high = high
                    .checked_sub(1)
                    .filter(|h| *h >= low)
                    .expect("this is a bug: no cached packet between the cache bounds");
                if self.packets.contains_key(&high) {
                    break;
                }
            }
        }

        self.lowest = Some(low);
        self.highest = Some(high);
        true
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.packets.contains_key(&seq)
    }

    pub fn payload(&self, seq: u32) -> Option<&[u8]> {
        self.packets.get(&seq).map(|p| p.as_slice())
    }

    pub fn lowest(&self) -> Option<u32> {
        self.lowest
    }

    pub fn highest(&self) -> Option<u32> {
        self.highest
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// The send window is full for `next_seq` iff the packet one window-width behind it has
    ///  not been acknowledged yet.
    pub fn window_full(&self, next_seq: u32) -> bool {
        match next_seq.checked_sub(SEND_WINDOW) {
            Some(blocking) => {
                let full = self.packets.contains_key(&blocking);
                if full {
                    debug!("send window full: packet #{} still unacknowledged", blocking);
                }
                full
            }
            None => false,
        }
    }
}
