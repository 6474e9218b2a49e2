use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use rand::seq::{IndexedRandom, SliceRandom};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::messages::{FailureDetectorData, FailureDetectorEvent};
use super::{ACK, PING, PING_REQ};
use crate::error::Result;
use crate::events::{EventStream, Subscription};
use crate::settings::{FailureDetectorConfig, MAX_PING_REQ_MEMBERS};
use crate::transport::{Address, Message, Transport};

/// Outstanding probe: resolved by an ACK whose data matches `from`/`to`
struct AckWaiter {
    from: Address,
    to: Address,
    tx: oneshot::Sender<()>,
}

struct DetectorInner {
    transport: Arc<dyn Transport>,
    local_address: Address,
    config: FailureDetectorConfig,
    members: ArcSwap<Vec<Address>>,
    suspected: DashSet<Address>,
    period: AtomicU64,
    pending_acks: DashMap<String, AckWaiter>,
    events: EventStream<FailureDetectorEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stopped: AtomicBool,
    /// Serializes target replacement against status transitions
    transitions: Mutex<()>,
    ping_member: RwLock<Option<Address>>,
    ping_req_members: RwLock<Option<Vec<Address>>>,
}

#[derive(Clone)]
pub struct FailureDetector {
    inner: Arc<DetectorInner>,
}

impl FailureDetector {
    pub fn new(transport: Arc<dyn Transport>, config: FailureDetectorConfig) -> Self {
        let local_address = transport.local_address();
        Self {
            inner: Arc::new(DetectorInner {
                transport,
                local_address,
                config,
                members: ArcSwap::from_pointee(Vec::new()),
                suspected: DashSet::new(),
                period: AtomicU64::new(0),
                pending_acks: DashMap::new(),
                events: EventStream::default(),
                tasks: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                transitions: Mutex::new(()),
                ping_member: RwLock::new(None),
                ping_req_members: RwLock::new(None),
            }),
        }
    }

    pub fn local_address(&self) -> Address {
        self.inner.local_address
    }

    /// Replace the probe targets. The local address and duplicates are dropped
    /// and the order is shuffled once. Suspicion of former targets is forgotten.
    pub fn set_cluster_members<I>(&self, members: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let local = self.inner.local_address;
        let mut seen = HashSet::new();
        let mut members: Vec<Address> = members
            .into_iter()
            .filter(|address| *address != local && seen.insert(*address))
            .collect();
        members.shuffle(&mut rand::rng());
        trace!("[{}] Probe targets now {:?}", local, members);

        let _guard = self.inner.transitions.lock();
        self.inner
            .suspected
            .retain(|address| members.contains(address));
        self.inner.members.store(Arc::new(members));
    }

    /// Current probe targets
    pub fn members(&self) -> Vec<Address> {
        self.inner.members.load().as_ref().clone()
    }

    pub fn suspected_members(&self) -> Vec<Address> {
        self.inner.suspected.iter().map(|a| *a).collect()
    }

    pub fn is_suspected(&self, address: &Address) -> bool {
        self.inner.suspected.contains(address)
    }

    /// Current probe period; also the correlation id of the latest probe
    pub fn period(&self) -> u64 {
        self.inner.period.load(Ordering::Acquire)
    }

    /// Status transitions until `stop`
    pub fn listen_status(&self) -> Subscription<FailureDetectorEvent> {
        self.inner.events.subscribe()
    }

    /// Force local suspicion without emitting an event
    pub fn suspect(&self, address: Address) {
        if address != self.inner.local_address {
            self.inner.suspected.insert(address);
        }
    }

    /// Clear local suspicion without emitting an event
    pub fn trust(&self, address: Address) {
        self.inner.suspected.remove(&address);
    }

    pub fn start(&self) {
        if self.inner.stopped.load(Ordering::Acquire)
            || self.inner.running.swap(true, Ordering::AcqRel)
        {
            return;
        }
        let transport = &self.inner.transport;
        let pings = transport.listen(PING);
        let ping_reqs = transport.listen(PING_REQ);
        let acks = transport.listen(ACK);

        let mut tasks = self.inner.tasks.lock();
        tasks.push(self.spawn_handler(pings, |this, message| async move {
            this.on_ping(message).await
        }));
        tasks.push(self.spawn_handler(ping_reqs, |this, message| async move {
            this.on_ping_req(message).await
        }));
        tasks.push(self.spawn_handler(acks, |this, message| async move {
            this.on_ack(message).await
        }));
        tasks.push(self.spawn_probe_loop());

        info!(
            "[{}] Failure detector started (ping_time={}ms, ping_timeout={}ms)",
            self.inner.local_address,
            self.inner.config.ping_time.as_millis(),
            self.inner.config.ping_timeout.as_millis()
        );
    }

    /// Abandons in-flight probes and completes the status stream. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
        self.inner.pending_acks.clear();
        self.inner.events.complete();
        info!("[{}] Failure detector stopped", self.inner.local_address);
    }

    fn spawn_handler<F, Fut>(&self, mut messages: Subscription<Message>, handler: F) -> JoinHandle<()>
    where
        F: Fn(FailureDetector, Message) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                let qualifier = message.qualifier.clone();
                if let Err(e) = handler(this.clone(), message).await {
                    warn!(
                        "[{}] Failed to handle {}: {}",
                        this.inner.local_address, qualifier, e
                    );
                }
            }
        })
    }

    fn spawn_probe_loop(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(this.inner.config.ping_time);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // probes still running when this task is aborted are dropped with the set
            let mut probes = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let probe = this.clone();
                        probes.spawn(async move { probe.probe().await });
                    }
                    Some(result) = probes.join_next() => match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("[{}] Probe period failed: {}", this.inner.local_address, e);
                        }
                        Err(e) if e.is_panic() => {
                            error!("[{}] Probe period panicked: {}", this.inner.local_address, e);
                        }
                        Err(_) => {}
                    },
                }
            }
        })
    }

    /// One probe period
    async fn probe(&self) -> Result<()> {
        if self.inner.members.load().is_empty() {
            return Ok(());
        }
        let target = match self.select_ping_member() {
            Some(target) => target,
            None => return Ok(()),
        };
        let local = self.inner.local_address;
        let period = self.inner.period.fetch_add(1, Ordering::AcqRel) + 1;
        let cid = period.to_string();

        let ack = self.register_waiter(&cid, local, target);
        let ping = Message::with_data(PING, &FailureDetectorData::new(local, target))?
            .with_correlation_id(cid.clone());
        trace!("[{}] PING {} (period {})", local, target, period);
        if let Err(e) = self.inner.transport.send(target, ping).await {
            warn!("[{}] Failed to send PING to {}: {}", local, target, e);
        }

        let acked = matches!(timeout(self.inner.config.ping_timeout, ack).await, Ok(Ok(())));
        self.inner.pending_acks.remove(&cid);
        if acked {
            trace!("[{}] ACK from {} (period {})", local, target, period);
            self.declare_trusted(target);
            return Ok(());
        }

        debug!(
            "[{}] No ACK from {} within {}ms (period {})",
            local,
            target,
            self.inner.config.ping_timeout.as_millis(),
            period
        );
        self.indirect_probe(target, &cid).await
    }

    async fn indirect_probe(&self, target: Address, cid: &str) -> Result<()> {
        let local = self.inner.local_address;
        let budget = match self.inner.config.ping_req_timeout() {
            Some(budget) => budget,
            None => {
                self.declare_suspected(target);
                return Ok(());
            }
        };
        let relays = self.select_ping_req_members(target);
        if relays.is_empty() {
            self.declare_suspected(target);
            return Ok(());
        }

        let ack = self.register_waiter(cid, local, target);
        let ping_req = Message::with_data(PING_REQ, &FailureDetectorData::new(local, target))?
            .with_correlation_id(cid);
        for relay in &relays {
            trace!("[{}] PING_REQ {} via {}", local, target, relay);
            if let Err(e) = self.inner.transport.send(*relay, ping_req.clone()).await {
                warn!("[{}] Failed to send PING_REQ to {}: {}", local, relay, e);
            }
        }

        let acked = matches!(timeout(budget, ack).await, Ok(Ok(())));
        self.inner.pending_acks.remove(cid);
        if acked {
            debug!("[{}] Relayed ACK from {}", local, target);
            self.declare_trusted(target);
        } else {
            debug!(
                "[{}] No relayed ACK from {} via {} relays",
                local,
                target,
                relays.len()
            );
            self.declare_suspected(target);
        }
        Ok(())
    }

    fn register_waiter(&self, cid: &str, from: Address, to: Address) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_acks
            .insert(cid.to_string(), AckWaiter { from, to, tx });
        rx
    }

    fn select_ping_member(&self) -> Option<Address> {
        if let Some(fixed) = *self.inner.ping_member.read() {
            return Some(fixed);
        }
        self.inner.members.load().choose(&mut rand::rng()).copied()
    }

    fn select_ping_req_members(&self, target: Address) -> Vec<Address> {
        let limit = self
            .inner
            .config
            .max_members_to_select
            .min(MAX_PING_REQ_MEMBERS);
        let candidates: Vec<Address> = match self.inner.ping_req_members.read().as_ref() {
            Some(fixed) => fixed.clone(),
            None => self.inner.members.load().as_ref().clone(),
        };
        let candidates: Vec<Address> = candidates
            .into_iter()
            .filter(|address| *address != target && *address != self.inner.local_address)
            .collect();
        candidates
            .choose_multiple(&mut rand::rng(), limit)
            .copied()
            .collect()
    }

    /// Answer pings addressed to us
    async fn on_ping(&self, message: Message) -> Result<()> {
        let data: FailureDetectorData = message.data()?;
        let local = self.inner.local_address;
        if data.to != local {
            debug!(
                "[{}] Ignoring PING addressed to {} from {}",
                local, data.to, data.from
            );
            return Ok(());
        }
        let mut ack = Message::with_data(ACK, &data)?;
        ack.correlation_id = message.correlation_id;
        self.inner.transport.send(data.from, ack).await
    }

    /// Probe the target on behalf of the issuer
    async fn on_ping_req(&self, message: Message) -> Result<()> {
        let data: FailureDetectorData = message.data()?;
        let local = self.inner.local_address;
        trace!("[{}] Probing {} for {}", local, data.to, data.from);
        let mut ping = Message::with_data(PING, &FailureDetectorData::relayed(local, data.to, data.from))?;
        ping.correlation_id = message.correlation_id;
        self.inner.transport.send(data.to, ping).await
    }

    async fn on_ack(&self, message: Message) -> Result<()> {
        let data: FailureDetectorData = message.data()?;

        if let Some(issuer) = data.original_issuer {
            // relay leg: hand the issuer an ACK matching its own direct probe
            let mut ack = Message::with_data(ACK, &FailureDetectorData::new(issuer, data.to))?;
            ack.correlation_id = message.correlation_id;
            return self.inner.transport.send(issuer, ack).await;
        }

        let cid = match message.correlation_id {
            Some(cid) => cid,
            None => return Ok(()),
        };
        let waiter = self
            .inner
            .pending_acks
            .remove_if(&cid, |_, waiter| waiter.from == data.from && waiter.to == data.to);
        match waiter {
            Some((_, waiter)) => {
                let _ = waiter.tx.send(());
            }
            None => trace!(
                "[{}] Stale ACK {} from {} to {}",
                self.inner.local_address,
                cid,
                data.from,
                data.to
            ),
        }
        Ok(())
    }

    /// Probes still in flight may finish after their target was dropped
    fn is_target(&self, address: &Address) -> bool {
        self.inner.members.load().contains(address)
            || self.inner.ping_member.read().as_ref() == Some(address)
    }

    fn declare_suspected(&self, address: Address) {
        if address == self.inner.local_address {
            return;
        }
        let _guard = self.inner.transitions.lock();
        if !self.is_target(&address) {
            trace!(
                "[{}] Dropping suspicion of former target {}",
                self.inner.local_address,
                address
            );
            return;
        }
        if self.inner.suspected.insert(address) {
            debug!("[{}] Member {} SUSPECTED", self.inner.local_address, address);
            self.inner
                .events
                .publish(FailureDetectorEvent::suspected(address));
        }
    }

    fn declare_trusted(&self, address: Address) {
        let _guard = self.inner.transitions.lock();
        if self.inner.suspected.remove(&address).is_some() && self.is_target(&address) {
            debug!("[{}] Member {} TRUSTED", self.inner.local_address, address);
            self.inner
                .events
                .publish(FailureDetectorEvent::trusted(address));
        }
    }

    #[cfg(test)]
    pub(crate) fn set_ping_member(&self, member: Option<Address>) {
        *self.inner.ping_member.write() = member;
    }

    #[cfg(test)]
    pub(crate) fn set_ping_req_members(&self, members: Option<Vec<Address>>) {
        *self.inner.ping_req_members.write() = members;
    }
}
