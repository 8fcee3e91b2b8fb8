//! Periodic control task.
//!
//! One loop services two cadences (measurement and uplink) against the
//! monotonic clock, then serves operator requests and heater intents, then
//! hands any pending long-press action to the uplink worker. It is the only
//! writer of instrument state and the only owner of the heater.

use embassy_sync::channel::TrySendError;
use embassy_time::{Duration, Instant, Timer};

use crate::calibration::{load_offset, CalibrationOffset, OffsetStore};
use crate::channels::{HeaterReceiver, SessionAction, SessionSignal, UplinkSender};
use crate::config::{RigConfig, CELSIUS_TO_KELVIN, CURRENT_SAMPLES, MEDIAN_WINDOW, OPERATOR_QUEUE_DEPTH};
use crate::error::{RequestError, SensorError};
use crate::filter::MedianFilter;
use crate::hal::{HeaterDrive, Indicator, PowerMonitor, Probe, ProbeBank};
use crate::heater::{Heater, HeaterDuty, HeaterIntent};
use crate::physics::compute_conductivity;
use crate::request::{OperatorPort, OperatorReply, OperatorRequest, StateReport};
use crate::state::{SharedState, Snapshot};
use crate::uplink::UplinkRecord;

// ── Cadence ───────────────────────────────────────────────────────────────────

/// Fixed interval checked against the monotonic clock.
///
/// Advances by whole periods so late polls do not push the schedule back.
/// When more than one full period behind, it resynchronises to `now`
/// instead of firing a burst of catch-up ticks.
#[derive(Clone, Copy, Debug)]
pub struct Cadence {
    period: Duration,
    last: Instant,
}

impl Cadence {
    /// First due one period after `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self { period, last: start }
    }

    pub fn due(&mut self, now: Instant) -> bool {
        let Some(elapsed) = now.checked_duration_since(self.last) else {
            return false;
        };
        if elapsed < self.period {
            return false;
        }
        self.last += self.period;
        let behind = now.checked_duration_since(self.last);
        if behind.is_some_and(|b| b >= self.period) {
            self.last = now;
        }
        true
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Hardware the control task takes ownership of.
pub struct RigIo<P, M, D, L, S> {
    pub probes: P,
    pub power: M,
    pub heater_drive: D,
    pub heater_led: L,
    pub store: S,
}

/// Shared handles the control task talks through.
pub struct ControlLinks<'a> {
    pub shared: &'a SharedState,
    pub uplink: UplinkSender<'a>,
    pub heater: HeaterReceiver<'a>,
    pub operator: &'a OperatorPort,
    pub session: &'a SessionSignal,
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct Controller<'a, P, M, D, L, S> {
    probes: P,
    power: M,
    heater: Heater<D, L>,
    store: S,
    links: ControlLinks<'a>,
    config: RigConfig,
    offset: CalibrationOffset,
    /// [T1, T2]
    filters: [MedianFilter<MEDIAN_WINDOW>; 2],
    measure_every: Cadence,
    upload_every: Cadence,
}

impl<'a, P, M, D, L, S> Controller<'a, P, M, D, L, S>
where
    P: ProbeBank,
    M: PowerMonitor,
    D: HeaterDrive,
    L: Indicator,
    S: OffsetStore,
{
    /// Load the offset, force the heater off and prime both filters with
    /// live readings. A sensor failure here is a boot failure.
    pub async fn boot(
        io: RigIo<P, M, D, L, S>,
        links: ControlLinks<'a>,
        config: RigConfig,
    ) -> Result<Self, SensorError> {
        let RigIo {
            probes,
            power,
            heater_drive,
            heater_led,
            mut store,
        } = io;

        let offset = load_offset(&mut store).await;
        let heater = Heater::new(heater_drive, heater_led);
        links.shared.modify(|s| {
            s.geometry = config.default_geometry;
            s.offset_k = offset.value();
            s.heater = HeaterDuty::OFF;
        });

        let now = Instant::now();
        let mut ctl = Self {
            probes,
            power,
            heater,
            store,
            links,
            config,
            offset,
            filters: [MedianFilter::new(), MedianFilter::new()],
            measure_every: Cadence::new(config.measure_interval, now),
            upload_every: Cadence::new(config.uplink_interval, now),
        };
        ctl.prefill().await?;
        info!("control ready, offset {} K", offset.value());
        Ok(ctl)
    }

    async fn prefill(&mut self) -> Result<(), SensorError> {
        for _ in 0..MEDIAN_WINDOW {
            let (t1, t2) = self.read_pair().await?;
            self.filters[0].push(t1);
            self.filters[1].push(t2);
            Timer::after(self.config.prefill_spacing).await;
        }
        Ok(())
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.step(Instant::now()).await;
            Timer::after(self.config.loop_yield).await;
        }
    }

    /// One loop iteration, steps strictly in order.
    pub async fn step(&mut self, now: Instant) {
        if self.measure_every.due(now) {
            self.measure().await;
        }
        if self.upload_every.due(now) {
            self.enqueue_uplink();
        }
        self.serve_requests().await;
        self.drain_heater_intents();
        if self.links.shared.take_long_press() {
            info!("long press: logout handed to uplink worker");
            self.links.session.signal(SessionAction::Logout);
        }
    }

    // ── Measurement ───────────────────────────────────────────────────────────

    async fn measure(&mut self) {
        if let Err(e) = self.measure_cycle().await {
            let total = self.links.shared.note_sensor_fault();
            warn!("measurement skipped: {} ({=u32} faults)", e, total);
        }
    }

    /// Reads everything first, so a failed read leaves the filters and the
    /// published values untouched.
    async fn measure_cycle(&mut self) -> Result<Snapshot, SensorError> {
        let (raw1, raw2) = self.read_pair().await?;
        let bus_voltage = plausible(self.power.bus_voltage().await?)?;
        let current_ma = self.sample_current().await?;

        let temp1 = self.filters[0].push(raw1);
        let temp2 = self.filters[1].push(raw2);
        let power_mw = bus_voltage * current_ma;
        let reading = Snapshot {
            temp1,
            temp2,
            bus_voltage,
            current_ma,
            power_mw,
        };

        self.links.shared.modify(|s| {
            s.reading = Some(reading);
            s.derived = Some(compute_conductivity(power_mw, s.geometry, temp1, temp2));
        });
        trace!("T1 {} K  T2 {} K  P {} mW", temp1, temp2, power_mw);
        Ok(reading)
    }

    /// Both probes in K, offset applied to T2.
    async fn read_pair(&mut self) -> Result<(f32, f32), SensorError> {
        let t1 = self.read_kelvin(Probe::T1).await?;
        let t2 = self.read_kelvin(Probe::T2).await? + self.offset.value();
        Ok((t1, t2))
    }

    async fn read_kelvin(&mut self, probe: Probe) -> Result<f32, SensorError> {
        let kelvin = self.probes.read_celsius(probe).await? + CELSIUS_TO_KELVIN;
        if !(kelvin >= 0.0) {
            return Err(SensorError::Implausible);
        }
        plausible(kelvin)
    }

    /// Mean of `CURRENT_SAMPLES` reads of the shared current line.
    async fn sample_current(&mut self) -> Result<f32, SensorError> {
        let mut sum = 0.0;
        for i in 0..CURRENT_SAMPLES {
            if i > 0 {
                Timer::after(self.config.current_sample_spacing).await;
            }
            sum += plausible(self.power.current_ma().await?)?;
        }
        Ok(sum / CURRENT_SAMPLES as f32)
    }

    // ── Uplink ────────────────────────────────────────────────────────────────

    /// Never waits: a full queue drops the newest record.
    fn enqueue_uplink(&mut self) {
        let state = self.links.shared.snapshot();
        let Some(record) = UplinkRecord::compose(&state) else {
            debug!("uplink due before first measurement, skipped");
            return;
        };
        if let Err(TrySendError::Full(_)) = self.links.uplink.try_send(record) {
            let total = self.links.shared.note_uplink_drop();
            warn!("uplink queue full, snapshot dropped ({=u32} total)", total);
        }
    }

    // ── Operator requests and heater ──────────────────────────────────────────

    /// Serve what is pending now. Bounded so a chatty client cannot starve
    /// the measurement cadence.
    pub async fn serve_requests(&mut self) {
        for _ in 0..OPERATOR_QUEUE_DEPTH {
            let Some(request) = self.links.operator.try_take() else {
                break;
            };
            let reply = self.handle(request).await;
            self.links.operator.reply(reply);
        }
    }

    async fn handle(&mut self, request: OperatorRequest) -> OperatorReply {
        if let Err(e) = request.validate() {
            warn!("operator request rejected: {}", e);
            return OperatorReply::Rejected(e);
        }
        match request {
            OperatorRequest::ReadState => {
                let shared = self.links.shared;
                let report = StateReport::new(
                    &shared.snapshot(),
                    shared.uplink_drops(),
                    shared.sensor_faults(),
                );
                OperatorReply::State(report)
            }
            OperatorRequest::SetThickness(mm) => {
                self.links.shared.modify(|s| s.geometry.thickness_mm = mm);
                info!("thickness set to {} mm", mm);
                OperatorReply::Applied
            }
            OperatorRequest::SetDiameter(mm) => {
                self.links.shared.modify(|s| s.geometry.diameter_mm = mm);
                info!("diameter set to {} mm", mm);
                OperatorReply::Applied
            }
            OperatorRequest::AdjustOffset(delta) => self.set_offset(self.offset.adjust(delta)).await,
            OperatorRequest::SetOffset(value) => {
                self.set_offset(CalibrationOffset::clamped(value)).await
            }
            OperatorRequest::SetHeaterLevel(level) => {
                self.apply_heater(HeaterIntent::Set(HeaterDuty::from_level(level as i32)));
                OperatorReply::Applied
            }
        }
    }

    /// Persisted on every change. A failed write keeps the new value in RAM.
    async fn set_offset(&mut self, next: Result<CalibrationOffset, RequestError>) -> OperatorReply {
        let offset = match next {
            Ok(offset) => offset,
            Err(e) => {
                warn!("offset rejected: {}", e);
                return OperatorReply::Rejected(e);
            }
        };
        self.offset = offset;
        self.links.shared.modify(|s| s.offset_k = offset.value());
        if let Err(e) = self.store.save(offset.value()).await {
            warn!("offset not persisted: {}", e);
        }
        info!("offset now {} K", offset.value());
        OperatorReply::Applied
    }

    fn drain_heater_intents(&mut self) {
        while let Ok(intent) = self.links.heater.try_receive() {
            self.apply_heater(intent);
        }
    }

    fn apply_heater(&mut self, intent: HeaterIntent) {
        let duty = self.heater.apply(intent);
        self.links.shared.modify(|s| s.heater = duty);
    }

    #[cfg(test)]
    pub(crate) fn probes_mut(&mut self) -> &mut P {
        &mut self.probes
    }

    #[cfg(test)]
    pub(crate) fn power(&self) -> &M {
        &self.power
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn heater(&self) -> &Heater<D, L> {
        &self.heater
    }
}

fn plausible(value: f32) -> Result<f32, SensorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SensorError::Implausible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{HeaterQueue, UplinkQueue};
    use crate::fakes::{test_config, FakeDrive, FakeLed, FakePower, FakeProbes, MemStore};
    use crate::physics::Conductivity;
    use crate::state::Geometry;
    use embassy_futures::block_on;
    use embassy_futures::join::join;

    type TestController<'a> = Controller<'a, FakeProbes, FakePower, FakeDrive, FakeLed, MemStore>;

    struct Rig {
        shared: SharedState,
        uplink: UplinkQueue,
        heater: HeaterQueue,
        operator: OperatorPort,
        session: SessionSignal,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                shared: SharedState::new(Geometry::DEFAULT),
                uplink: UplinkQueue::new(),
                heater: HeaterQueue::new(),
                operator: OperatorPort::new(),
                session: SessionSignal::new(),
            }
        }

        fn links(&self) -> ControlLinks<'_> {
            ControlLinks {
                shared: &self.shared,
                uplink: self.uplink.sender(),
                heater: self.heater.receiver(),
                operator: &self.operator,
                session: &self.session,
            }
        }

        fn boot(&self, probes: FakeProbes, store: MemStore) -> Result<TestController<'_>, SensorError> {
            self.boot_with_power(probes, FakePower::new(5.0, 20.0), store)
        }

        fn boot_with_power(
            &self,
            probes: FakeProbes,
            power: FakePower,
            store: MemStore,
        ) -> Result<TestController<'_>, SensorError> {
            let io = RigIo {
                probes,
                power,
                heater_drive: FakeDrive::default(),
                heater_led: FakeLed::default(),
                store,
            };
            block_on(Controller::boot(io, self.links(), test_config()))
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn cadence_advances_by_whole_periods() {
        let mut c = Cadence::new(Duration::from_millis(1000), Instant::from_millis(0));
        assert!(!c.due(Instant::from_millis(500)));
        assert!(c.due(Instant::from_millis(1000)));
        assert!(!c.due(Instant::from_millis(1500)));
        // late by 50 ms, next still due at 3000
        assert!(c.due(Instant::from_millis(2050)));
        assert!(!c.due(Instant::from_millis(2990)));
        assert!(c.due(Instant::from_millis(3000)));
    }

    #[test]
    fn cadence_resyncs_when_far_behind() {
        let mut c = Cadence::new(Duration::from_millis(1000), Instant::from_millis(0));
        assert!(c.due(Instant::from_millis(5500)));
        assert!(!c.due(Instant::from_millis(6000)));
        assert!(c.due(Instant::from_millis(6500)));
    }

    #[test]
    fn boot_fails_when_prefill_cannot_read() {
        let rig = Rig::new();
        let result = rig.boot(FakeProbes::failing(), MemStore::default());
        assert!(matches!(result, Err(SensorError::Bus)));
    }

    #[test]
    fn measurement_applies_offset_to_t2_in_kelvin() {
        let rig = Rig::new();
        let mut ctl = rig
            .boot(FakeProbes::new(25.0, 20.0), MemStore::with_raw(1.5f32.to_le_bytes()))
            .unwrap();
        assert_eq!(rig.shared.snapshot().reading, None);

        block_on(ctl.step(Instant::now()));

        let state = rig.shared.snapshot();
        let reading = state.reading.unwrap();
        assert!(close(reading.temp1, 298.15));
        assert!(close(reading.temp2, 294.65));
        assert!(close(reading.power_mw, 100.0));
        assert_eq!(state.offset_k, 1.5);

        let derived = state.derived.unwrap();
        assert!(close(derived.delta_t, 3.5));
        assert!(matches!(derived.conductivity, Conductivity::Defined(_)));
    }

    #[test]
    fn current_is_mean_of_all_samples() {
        let rig = Rig::new();
        let currents = [10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0, 26.0, 28.0];
        assert_eq!(currents.len(), CURRENT_SAMPLES);
        let mut ctl = rig
            .boot_with_power(
                FakeProbes::new(25.0, 20.0),
                FakePower::sequence(5.0, &currents),
                MemStore::default(),
            )
            .unwrap();
        assert_eq!(ctl.power().current_reads, 0);

        block_on(ctl.step(Instant::now()));

        assert_eq!(ctl.power().current_reads, CURRENT_SAMPLES);
        let reading = rig.shared.snapshot().reading.unwrap();
        assert!(close(reading.current_ma, 19.0));
        assert!(close(reading.power_mw, 95.0));
    }

    #[test]
    fn sensor_fault_keeps_last_reading_and_counts() {
        let rig = Rig::new();
        let mut ctl = rig.boot(FakeProbes::new(25.0, 20.0), MemStore::default()).unwrap();
        block_on(ctl.step(Instant::now()));
        let before = rig.shared.snapshot().reading;

        ctl.probes_mut().t1_c = f32::NAN;
        block_on(ctl.step(Instant::now()));
        ctl.probes_mut().t1_c = -400.0;
        block_on(ctl.step(Instant::now()));

        assert_eq!(rig.shared.snapshot().reading, before);
        assert_eq!(rig.shared.sensor_faults(), 2);
    }

    #[test]
    fn sixth_pending_snapshot_is_dropped_not_blocked() {
        let rig = Rig::new();
        let mut ctl = rig.boot(FakeProbes::new(30.0, 20.0), MemStore::default()).unwrap();
        for _ in 0..6 {
            block_on(ctl.step(Instant::now()));
        }
        assert_eq!(rig.shared.uplink_drops(), 1);

        let mut pending = 0;
        while rig.uplink.try_receive().is_ok() {
            pending += 1;
        }
        assert_eq!(pending, 5);
    }

    #[test]
    fn operator_writes_are_validated_and_persisted() {
        let rig = Rig::new();
        let mut ctl = rig.boot(FakeProbes::new(25.0, 20.0), MemStore::default()).unwrap();

        let (reply, ()) = block_on(join(
            rig.operator.call(OperatorRequest::SetThickness(0.0)),
            ctl.serve_requests(),
        ));
        assert_eq!(reply, OperatorReply::Rejected(RequestError::OutOfRange));
        assert_eq!(rig.shared.snapshot().geometry, Geometry::DEFAULT);

        let (reply, ()) = block_on(join(
            rig.operator.call(OperatorRequest::SetDiameter(20.0)),
            ctl.serve_requests(),
        ));
        assert_eq!(reply, OperatorReply::Applied);
        assert_eq!(rig.shared.snapshot().geometry.diameter_mm, 20.0);

        let (reply, ()) = block_on(join(
            rig.operator.call(OperatorRequest::AdjustOffset(12.0)),
            ctl.serve_requests(),
        ));
        assert_eq!(reply, OperatorReply::Applied);
        assert_eq!(rig.shared.snapshot().offset_k, 10.0);
        assert_eq!(ctl.store().saved, Some(10.0));

        let (reply, ()) = block_on(join(
            rig.operator.call(OperatorRequest::ReadState),
            ctl.serve_requests(),
        ));
        let OperatorReply::State(report) = reply else {
            panic!("expected state, got {reply:?}");
        };
        assert_eq!(report.offset, 10.0);
        assert_eq!(report.diameter, 20.0);
    }

    #[test]
    fn heater_changes_only_through_the_controller() {
        let rig = Rig::new();
        let mut ctl = rig.boot(FakeProbes::new(25.0, 20.0), MemStore::default()).unwrap();
        assert_eq!(rig.shared.snapshot().heater, HeaterDuty::OFF);

        rig.heater.try_send(HeaterIntent::Toggle).unwrap();
        block_on(ctl.step(Instant::now()));
        assert_eq!(rig.shared.snapshot().heater, HeaterDuty::FULL);
        assert_eq!(ctl.heater().duty(), HeaterDuty::FULL);

        let (reply, ()) = block_on(join(
            rig.operator.call(OperatorRequest::SetHeaterLevel(0)),
            ctl.serve_requests(),
        ));
        assert_eq!(reply, OperatorReply::Applied);
        assert_eq!(rig.shared.snapshot().heater, HeaterDuty::OFF);
    }

    #[test]
    fn long_press_is_handed_to_session_once() {
        let rig = Rig::new();
        let mut ctl = rig.boot(FakeProbes::new(25.0, 20.0), MemStore::default()).unwrap();

        rig.shared.raise_long_press();
        block_on(ctl.step(Instant::now()));
        assert_eq!(rig.session.try_take(), Some(SessionAction::Logout));

        block_on(ctl.step(Instant::now()));
        assert_eq!(rig.session.try_take(), None);
    }
}
