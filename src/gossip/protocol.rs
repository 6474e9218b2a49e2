use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::messages::{Gossip, GossipRequest};
use super::GOSSIP_REQ;
use crate::error::Result;
use crate::events::{EventStream, Subscription};
use crate::settings::GossipConfig;
use crate::transport::{Address, Message, Transport};

/// Forward-queue entry
#[derive(Debug)]
struct GossipState {
    gossip: Gossip,
    /// Period in which the envelope was first seen here
    period: u64,
    /// Peers known to have the envelope
    infected: HashSet<Address>,
}

struct GossipInner {
    member_id: String,
    transport: Arc<dyn Transport>,
    local_address: Address,
    config: GossipConfig,
    members: ArcSwap<Vec<Address>>,
    gossips: DashMap<String, GossipState>,
    seen: DashMap<String, u64>,
    period: AtomicU64,
    sequence: AtomicU64,
    events: EventStream<Message>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
}

#[derive(Clone)]
pub struct GossipProtocol {
    inner: Arc<GossipInner>,
}

impl GossipProtocol {
    pub fn new(member_id: impl Into<String>, transport: Arc<dyn Transport>, config: GossipConfig) -> Self {
        let local_address = transport.local_address();
        Self {
            inner: Arc::new(GossipInner {
                member_id: member_id.into(),
                transport,
                local_address,
                config,
                members: ArcSwap::from_pointee(Vec::new()),
                gossips: DashMap::new(),
                seen: DashMap::new(),
                period: AtomicU64::new(0),
                sequence: AtomicU64::new(0),
                events: EventStream::default(),
                tasks: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a message for dissemination; returns its gossip id
    pub fn spread(&self, message: Message) -> String {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::AcqRel);
        let gossip_id = format!("{}-{}", self.inner.member_id, sequence);
        let period = self.period();

        self.inner.seen.insert(gossip_id.clone(), period);
        self.inner.gossips.insert(
            gossip_id.clone(),
            GossipState {
                gossip: Gossip {
                    gossip_id: gossip_id.clone(),
                    message,
                },
                period,
                infected: HashSet::new(),
            },
        );
        trace!("[{}] Spreading gossip {}", self.inner.member_id, gossip_id);
        gossip_id
    }

    /// Payloads received from peers, each delivered at most once
    pub fn listen(&self) -> Subscription<Message> {
        self.inner.events.subscribe()
    }

    /// Peers used for fan-out; the local address is dropped
    pub fn set_cluster_members<I>(&self, members: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let local = self.inner.local_address;
        let mut unique = HashSet::new();
        let members: Vec<Address> = members
            .into_iter()
            .filter(|address| *address != local && unique.insert(*address))
            .collect();
        self.inner.members.store(Arc::new(members));
    }

    pub fn members(&self) -> Vec<Address> {
        self.inner.members.load().as_ref().clone()
    }

    pub fn period(&self) -> u64 {
        self.inner.period.load(Ordering::Acquire)
    }

    /// Ids still in the forward queue
    pub fn pending_gossips(&self) -> Vec<String> {
        self.inner.gossips.iter().map(|g| g.key().clone()).collect()
    }

    pub fn has_seen(&self, gossip_id: &str) -> bool {
        self.inner.seen.contains_key(gossip_id)
    }

    pub fn start(&self) {
        if self.inner.stopped.load(Ordering::Acquire)
            || self.inner.running.swap(true, Ordering::AcqRel)
        {
            return;
        }
        let mut requests = self.inner.transport.listen(GOSSIP_REQ);
        let mut tasks = self.inner.tasks.lock();

        let this = self.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(message) = requests.recv().await {
                if let Err(e) = this.on_gossip_request(message) {
                    warn!("[{}] Dropping gossip request: {}", this.inner.member_id, e);
                }
            }
        }));

        let this = self.clone();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(this.inner.config.gossip_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = this.do_spread().await {
                    error!("[{}] Gossip period failed: {}", this.inner.member_id, e);
                }
            }
        }));

        info!(
            "[{}] Gossip started on {} (interval={}ms, fanout={})",
            self.inner.member_id,
            self.inner.local_address,
            self.inner.config.gossip_interval.as_millis(),
            self.inner.config.max_members_to_select
        );
    }

    /// Idempotent; completes the `listen` stream
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
        self.inner.events.complete();
        info!("[{}] Gossip stopped", self.inner.member_id);
    }

    fn on_gossip_request(&self, message: Message) -> Result<()> {
        let request: GossipRequest = message.data()?;
        let sender = message.sender;
        let period = self.period();

        for gossip in request.gossips {
            match self.inner.seen.entry(gossip.gossip_id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(period);
                    trace!(
                        "[{}] Received gossip {} from {}",
                        self.inner.member_id,
                        gossip.gossip_id,
                        request.from
                    );
                    self.inner.events.publish(gossip.message.clone());
                    self.inner.gossips.insert(
                        gossip.gossip_id.clone(),
                        GossipState {
                            gossip,
                            period,
                            infected: sender.into_iter().collect(),
                        },
                    );
                }
                Entry::Occupied(_) => {
                    if let (Some(sender), Some(mut state)) =
                        (sender, self.inner.gossips.get_mut(&gossip.gossip_id))
                    {
                        state.infected.insert(sender);
                    }
                }
            }
        }
        Ok(())
    }

    /// One dissemination period
    pub(crate) async fn do_spread(&self) -> Result<()> {
        let period = self.inner.period.fetch_add(1, Ordering::AcqRel) + 1;

        if !self.inner.gossips.is_empty() {
            for target in self.select_gossip_members() {
                let gossips = self.select_gossips_to_send(period, target);
                if gossips.is_empty() {
                    continue;
                }
                let count = gossips.len();
                let request = GossipRequest {
                    from: self.inner.member_id.clone(),
                    gossips,
                };
                let message = Message::with_data(GOSSIP_REQ, &request)?;
                match self.inner.transport.send(target, message).await {
                    Ok(()) => trace!(
                        "[{}] Sent {} gossips to {} (period {})",
                        self.inner.member_id,
                        count,
                        target,
                        period
                    ),
                    Err(e) => warn!(
                        "[{}] Failed to send gossips to {}: {}",
                        self.inner.member_id, target, e
                    ),
                }
            }
        }

        self.sweep(period);
        Ok(())
    }

    fn select_gossip_members(&self) -> Vec<Address> {
        let members = self.inner.members.load();
        members
            .choose_multiple(&mut rand::rng(), self.inner.config.max_members_to_select)
            .copied()
            .collect()
    }

    /// Oldest live envelopes the target does not have, marked as sent to it
    fn select_gossips_to_send(&self, period: u64, target: Address) -> Vec<Gossip> {
        let spread_periods = self.inner.config.gossip_periods_to_spread;
        let mut candidates: Vec<(u64, String)> = self
            .inner
            .gossips
            .iter()
            .filter(|state| {
                period.saturating_sub(state.period) <= spread_periods
                    && !state.infected.contains(&target)
            })
            .map(|state| (state.period, state.key().clone()))
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .take(self.inner.config.max_gossip_sent)
            .filter_map(|(_, gossip_id)| {
                let mut state = self.inner.gossips.get_mut(&gossip_id)?;
                state.infected.insert(target);
                Some(state.gossip.clone())
            })
            .collect()
    }

    fn sweep(&self, period: u64) {
        let spread_periods = self.inner.config.gossip_periods_to_spread;
        let history_periods = self.inner.config.gossip_seen_history_periods;
        let before = self.inner.gossips.len();
        self.inner
            .gossips
            .retain(|_, state| period.saturating_sub(state.period) < spread_periods);
        self.inner
            .seen
            .retain(|_, seen_period| period.saturating_sub(*seen_period) <= history_periods);

        let expired = before.saturating_sub(self.inner.gossips.len());
        if expired > 0 {
            debug!(
                "[{}] Expired {} gossips at period {}",
                self.inner.member_id, expired, period
            );
        }
    }
}
