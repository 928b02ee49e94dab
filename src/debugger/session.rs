use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::debugger::breakpoint::{Breakpoint, BreakpointId};
use crate::debugger::core::{Completion, DebuggerManager, ManagerConfig, RequestId, TimerCommand, TimerEvent};
use crate::debugger::events::DebuggerEvent;
use crate::debugger::timer::DelayedTask;
use crate::error::{DebuggerError, ProtocolError};
use crate::protocol::{dispatch, GatewayEvent, GatewayResponse, ProtocolEventHandler, ProtocolGateway, TargetId};
use crate::settings::DebuggerSettings;

type ResponseFuture = Pin<Box<dyn Future<Output = (RequestId, Result<GatewayResponse, ProtocolError>)> + Send>>;

/// One thing the session has to react to
enum Input {
    Response(RequestId, Result<GatewayResponse, ProtocolError>),
    Event(TargetId, GatewayEvent),
    Timer(TimerEvent),
    EventsClosed,
}

/// Drives a [`DebuggerManager`] against a live gateway.
///
/// Queued commands are sent concurrently; responses, target events and
/// timers are fed back into the manager one at a time.
pub struct DebuggerSession<G: ProtocolGateway + ?Sized + 'static> {
    manager: DebuggerManager,
    gateway: Arc<G>,
    in_flight: FuturesUnordered<ResponseFuture>,
    events: mpsc::UnboundedReceiver<(TargetId, GatewayEvent)>,
    events_closed: bool,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timers: mpsc::UnboundedReceiver<TimerEvent>,
    /// Armed timers by token; dropping one aborts it
    scheduled: HashMap<u64, DelayedTask>,
}

impl<G: ProtocolGateway + ?Sized + 'static> DebuggerSession<G> {
    /// Negotiate capabilities, initialize the main target and restore persisted breakpoints
    pub async fn connect(
        gateway: Arc<G>,
        events: mpsc::UnboundedReceiver<(TargetId, GatewayEvent)>,
        settings: DebuggerSettings,
        config: ManagerConfig,
    ) -> Result<Self> {
        let capabilities = gateway.capabilities().await;
        info!("Connected to inspector backend: {:?}", capabilities);

        let mut manager = DebuggerManager::new(settings, capabilities, config);
        let (timer_tx, timers) = mpsc::unbounded_channel();

        let main = manager.main_target().clone();
        manager.initialize_target(main);
        manager.restore_breakpoints();

        let mut session = Self {
            manager,
            gateway,
            in_flight: FuturesUnordered::new(),
            events,
            events_closed: false,
            timer_tx,
            timers,
            scheduled: HashMap::new(),
        };
        session.flush();
        Ok(session)
    }

    pub fn manager(&self) -> &DebuggerManager {
        &self.manager
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DebuggerEvent> {
        self.manager.subscribe()
    }

    /// Mutate the manager and send whatever it queued
    pub fn with_manager<R>(&mut self, f: impl FnOnce(&mut DebuggerManager) -> R) -> R {
        let result = f(&mut self.manager);
        self.flush();
        result
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> BreakpointId {
        self.with_manager(|manager| manager.add_breakpoint(breakpoint))
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> Result<Breakpoint, DebuggerError> {
        self.with_manager(|manager| manager.remove_breakpoint(id))
    }

    pub fn set_breakpoints_enabled(&mut self, enabled: bool) {
        self.with_manager(|manager| manager.set_breakpoints_enabled(enabled))
    }

    pub fn initialize_target(&mut self, target: TargetId) {
        self.with_manager(|manager| manager.initialize_target(target))
    }

    pub fn target_removed(&mut self, target: &TargetId) {
        self.with_manager(|manager| manager.target_removed(target))
    }

    pub async fn pause(&mut self) -> Result<(), DebuggerError> {
        let completion = self.with_manager(DebuggerManager::pause);
        self.drive_until(completion).await
    }

    pub async fn resume(&mut self) -> Result<(), DebuggerError> {
        let completion = self.with_manager(DebuggerManager::resume);
        self.drive_until(completion).await
    }

    pub async fn step_over(&mut self) -> Result<(), DebuggerError> {
        let completion = self.with_manager(DebuggerManager::step_over)?;
        self.drive_until(completion).await
    }

    pub async fn step_into(&mut self) -> Result<(), DebuggerError> {
        let completion = self.with_manager(DebuggerManager::step_into)?;
        self.drive_until(completion).await
    }

    pub async fn step_out(&mut self) -> Result<(), DebuggerError> {
        let completion = self.with_manager(DebuggerManager::step_out)?;
        self.drive_until(completion).await
    }

    /// Process input until nothing is in flight and no event is waiting
    pub async fn settle(&mut self) {
        loop {
            while let Ok((target, event)) = self.events.try_recv() {
                self.handle(Input::Event(target, event));
            }
            if self.in_flight.is_empty() && !self.manager.has_pending_timer() {
                return;
            }

            match self.next_input().await {
                Some(input) => self.handle(input),
                None => return,
            }
        }
    }

    /// Process input until `completion` resolves
    async fn drive_until(&mut self, mut completion: Completion) -> Result<(), DebuggerError> {
        loop {
            if let Some(result) = completion.try_result() {
                return result;
            }

            match self.next_input().await {
                Some(input) => self.handle(input),
                None => {
                    warn!("Nothing left to wait for; abandoning operation");
                    return Err(DebuggerError::Cancelled);
                }
            }
        }
    }

    async fn next_input(&mut self) -> Option<Input> {
        let waiting_on_timer = self.manager.has_pending_timer();

        tokio::select! {
            Some((id, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                Some(Input::Response(id, result))
            }
            event = self.events.recv(), if !self.events_closed => match event {
                Some((target, event)) => Some(Input::Event(target, event)),
                None => Some(Input::EventsClosed),
            },
            Some(timer) = self.timers.recv(), if waiting_on_timer && !self.scheduled.is_empty() => {
                Some(Input::Timer(timer))
            }
            else => None,
        }
    }

    fn handle(&mut self, input: Input) {
        match input {
            Input::Response(id, result) => self.manager.handle_response(id, result),
            Input::Event(target, event) => self.manager.handle_event(target, event),
            Input::Timer(timer) => {
                self.scheduled.remove(&timer.token());
                self.manager.handle_timer(timer)
            }
            Input::EventsClosed => {
                warn!("Event stream closed");
                self.events_closed = true;
            }
        }
        self.flush();
    }

    fn flush(&mut self) {
        for command in self.manager.take_timer_commands() {
            match command {
                TimerCommand::Schedule { event, delay } => {
                    let task = DelayedTask::schedule(delay, self.timer_tx.clone(), event);
                    self.scheduled.insert(event.token(), task);
                }
                TimerCommand::Cancel { token } => {
                    if let Some(task) = self.scheduled.remove(&token) {
                        task.cancel();
                    }
                }
            }
        }

        for request in self.manager.take_requests() {
            let gateway = Arc::clone(&self.gateway);
            debug!("Sending #{} to {}", request.id, request.target);

            self.in_flight.push(Box::pin(async move {
                let result = dispatch(gateway.as_ref(), request.target, request.command).await;
                (request.id, result)
            }));
        }
    }
}
