use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_total: IntCounterVec,
    pub booking_transitions_total: IntCounterVec,
    pub online_drivers: IntGauge,
    pub board_refreshes_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_total = IntCounterVec::new(
            Opts::new("bookings_total", "Booking creation attempts by outcome"),
            &["outcome"],
        )
        .expect("valid bookings_total metric");

        let booking_transitions_total = IntCounterVec::new(
            Opts::new(
                "booking_transitions_total",
                "Booking status transitions by event and outcome",
            ),
            &["event", "outcome"],
        )
        .expect("valid booking_transitions_total metric");

        let online_drivers = IntGauge::new(
            "online_drivers",
            "Drivers currently publishing on the presence channel",
        )
        .expect("valid online_drivers metric");

        let board_refreshes_total = IntCounterVec::new(
            Opts::new(
                "board_refreshes_total",
                "Dispatch board refreshes by trigger",
            ),
            &["trigger"],
        )
        .expect("valid board_refreshes_total metric");

        registry
            .register(Box::new(bookings_total.clone()))
            .expect("register bookings_total");
        registry
            .register(Box::new(booking_transitions_total.clone()))
            .expect("register booking_transitions_total");
        registry
            .register(Box::new(online_drivers.clone()))
            .expect("register online_drivers");
        registry
            .register(Box::new(board_refreshes_total.clone()))
            .expect("register board_refreshes_total");

        Self {
            registry,
            bookings_total,
            booking_transitions_total,
            online_drivers,
            board_refreshes_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
