//! Bridge events tracked by the counters

/// Something that happened at the host/script boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BridgeEvent {
    CallbackRegistered,
    CallbackEvicted,
    TrampolineCall,
    JobRun,
    TimerFired,
}

impl BridgeEvent {
    pub const COUNT: usize = 5;

    pub const ALL: [BridgeEvent; Self::COUNT] = [
        BridgeEvent::CallbackRegistered,
        BridgeEvent::CallbackEvicted,
        BridgeEvent::TrampolineCall,
        BridgeEvent::JobRun,
        BridgeEvent::TimerFired,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            BridgeEvent::CallbackRegistered => "callbacks_registered",
            BridgeEvent::CallbackEvicted => "callbacks_evicted",
            BridgeEvent::TrampolineCall => "trampoline_calls",
            BridgeEvent::JobRun => "jobs_run",
            BridgeEvent::TimerFired => "timers_fired",
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    counts: [u64; BridgeEvent::COUNT],
}

impl CounterSnapshot {
    pub(crate) fn from_counts(counts: [u64; BridgeEvent::COUNT]) -> Self {
        Self { counts }
    }

    pub fn get(&self, event: BridgeEvent) -> u64 {
        self.counts[event.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BridgeEvent, u64)> + '_ {
        BridgeEvent::ALL.iter().map(|event| (*event, self.get(*event)))
    }
}
