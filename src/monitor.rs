//! Wiring of the whole monitor: link, channels, analysis and session.

use crate::config::Config;
use crate::core::{BaselineCalibrator, StressClassifier, WindowCollector};
use crate::error::ChannelError;
use crate::link::{
    button_queue, BaselineMailbox, DeviceMirror, Framer, Router, SharedDeviceMirror, Transport,
    MESSAGE_PREFIXES,
};
use crate::sensors::{
    ChannelFeed, DeviceLinkSource, HrBridgeSource, SensorChannel, SensorFeed, SignalKind,
};
use crate::session::{
    texts, Display, Library, NoopObserver, Playback, SessionObserver, SessionPipeline,
    SessionStateMachine,
};
use crate::transparency::SharedTelemetry;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// A fully wired monitor.
pub struct Monitor<P: Playback, L: Library, O: SessionObserver = NoopObserver> {
    gsr: SensorChannel,
    hr: SensorChannel,
    hr_bridged: bool,
    device: SharedDeviceMirror,
    display: Arc<dyn Display>,
    telemetry: SharedTelemetry,
    machine: SessionStateMachine<P, L, O>,
}

impl<P: Playback, L: Library> Monitor<P, L> {
    /// Wire a device link, and optionally an HR bridge, to a session.
    ///
    /// Without an HR bridge the HR channel stays disconnected.
    pub fn assemble<T, H>(
        config: &Config,
        device_link: T,
        hr_bridge: Option<H>,
        display: Arc<dyn Display>,
        playback: P,
        library: L,
        telemetry: SharedTelemetry,
    ) -> Self
    where
        T: Transport + 'static,
        H: Transport + 'static,
    {
        let (buttons_tx, buttons_rx) = button_queue(config.session.button_queue, telemetry.clone());
        let mailbox = BaselineMailbox::new();
        let device = Arc::new(DeviceMirror::new());

        let router = Router::new(buttons_tx, mailbox.clone(), device.clone(), telemetry.clone())
            .with_display(display.clone());
        let framer = Framer::with_max_line(MESSAGE_PREFIXES, config.link.max_line);
        let gsr = SensorChannel::new(
            config.channel_config(SignalKind::Gsr),
            Box::new(DeviceLinkSource::new(device_link, framer, router)),
            telemetry.clone(),
        );

        let hr_bridged = hr_bridge.is_some();
        let hr_config = config.channel_config(SignalKind::Hr);
        let hr = match hr_bridge {
            Some(transport) => SensorChannel::new(
                hr_config,
                Box::new(HrBridgeSource::new(
                    transport,
                    config.link.max_line,
                    telemetry.clone(),
                )),
                telemetry.clone(),
            ),
            None => SensorChannel::unconnected(hr_config, telemetry.clone()),
        };

        let gsr_feed: Arc<dyn SensorFeed> = Arc::new(gsr.feed());
        let hr_feed: Arc<dyn SensorFeed> = Arc::new(hr.feed());

        let pipeline = SessionPipeline {
            calibrator: BaselineCalibrator::new(
                config.calibration_config(),
                gsr_feed.clone(),
                hr_feed.clone(),
                mailbox.clone(),
                telemetry.clone(),
            ),
            collector: WindowCollector::new(
                gsr_feed,
                hr_feed,
                config.window.sampling_rate_hz,
                config.window.quick_window,
                telemetry.clone(),
            ),
            classifier: StressClassifier::load(
                config.classifier.model_path.as_deref(),
                config.classifier.rules,
                config.classifier.history_capacity,
                telemetry.clone(),
            ),
            mailbox,
            telemetry: telemetry.clone(),
        };

        let machine = SessionStateMachine::new(
            config.session_config(),
            pipeline,
            buttons_rx,
            display.clone(),
            playback,
            library,
        )
        .with_export_path(config.export_path.clone());

        Self {
            gsr,
            hr,
            hr_bridged,
            device,
            display,
            telemetry,
            machine,
        }
    }
}

impl<P: Playback, L: Library, O: SessionObserver> Monitor<P, L, O> {
    /// Replace the session observer.
    pub fn with_observer<O2: SessionObserver>(self, observer: O2) -> Monitor<P, L, O2> {
        Monitor {
            gsr: self.gsr,
            hr: self.hr,
            hr_bridged: self.hr_bridged,
            device: self.device,
            display: self.display,
            telemetry: self.telemetry,
            machine: self.machine.with_observer(observer),
        }
    }

    /// Start the channel workers.
    pub fn start(&mut self) -> Result<(), ChannelError> {
        self.gsr.start()?;
        if self.hr_bridged {
            if let Err(e) = self.hr.start() {
                warn!(error = %e, "HR channel failed to start, continuing without HR");
            }
        } else {
            info!("No HR bridge configured, HR features will be zero");
        }
        Ok(())
    }

    /// Start the channels, run sessions until `shutdown` is set, then stop.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), ChannelError> {
        self.start()?;
        self.display.show(&texts::sensor_status(
            self.gsr.is_running(),
            self.hr.is_running(),
        ));
        self.machine.run(shutdown);
        self.stop();
        Ok(())
    }

    /// Stop both channels and persist telemetry.
    pub fn stop(&mut self) {
        self.gsr.stop();
        self.hr.stop();
        if let Err(e) = self.telemetry.save() {
            warn!(error = %e, "Failed to save telemetry");
        }
    }

    pub fn gsr_feed(&self) -> ChannelFeed {
        self.gsr.feed()
    }

    pub fn hr_feed(&self) -> ChannelFeed {
        self.hr.feed()
    }

    /// Last known device status.
    pub fn device(&self) -> &DeviceMirror {
        &self.device
    }

    pub fn machine(&self) -> &SessionStateMachine<P, L, O> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut SessionStateMachine<P, L, O> {
        &mut self.machine
    }
}
