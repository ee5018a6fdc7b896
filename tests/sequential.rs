//! Integration tests for the Flip -> Setup -> Countdown chain.
//!
//! Bars are built by hand: a short bounce that flips, a run that completes
//! a setup, then a trend long enough to complete the countdown.

use yasd::prelude::*;

fn bar(instrument: &str, ts: i64, close: f64) -> Bar {
    Bar::new(instrument, ts, close, close + 1.0, close - 1.0, close, 1000.0)
}

fn bars(instrument: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| bar(instrument, i as i64, c))
        .collect()
}

/// Bear flip at bar 5, buy setup at bar 13, buy countdown at bar 25.
fn buy_sequence() -> Vec<f64> {
    let mut closes = vec![100.0, 102.0, 101.0, 101.5, 103.0, 99.0];
    closes.extend((0..20).map(|i| 98.0 - i as f64));
    closes
}

/// Bull flip at bar 5, sell setup at bar 13, sell countdown at bar 25.
fn sell_sequence() -> Vec<f64> {
    let mut closes = vec![100.0, 98.0, 99.0, 98.5, 97.0, 101.0];
    closes.extend((0..20).map(|i| 102.0 + i as f64));
    closes
}

fn engine() -> Sequential<Bar> {
    Sequential::new(SequentialConfig::default()).unwrap()
}

#[test]
fn test_buy_sequence_end_to_end() {
    let events = bars("AAA", &buy_sequence());
    let signals = engine().scan(&events).unwrap();

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].index, 25);

    let countdown = &signals[0].signal;
    assert_eq!(countdown.direction, SignalDirection::Buy);
    assert_eq!(countdown.bars.len(), 13);
    assert_eq!(countdown.qualifying_positions, (0..13).collect::<Vec<_>>());
    assert_eq!(countdown.qualifier().unwrap().close, 84.0);
    // max low of the counted bars sits on the close-91 bar
    assert_eq!(countdown.high, 92.0);
    assert_eq!(countdown.low, 90.0);
    assert_eq!(countdown.risk_level().unwrap(), 88.0);

    let setup = countdown.setup.as_ref().unwrap();
    assert_eq!(setup.direction, SignalDirection::Buy);
    assert_eq!(setup.flip.direction, FlipDirection::Bear);
    assert_eq!(setup.bars.first().unwrap().close, 99.0);
    assert_eq!(setup.bars.last().unwrap().close, 91.0);
    assert_eq!(setup.perfection, 92.0);
    assert!(setup.is_perfect());
    assert_eq!(setup.risk_level().unwrap(), 96.0);
}

#[test]
fn test_sell_sequence_end_to_end() {
    let events = bars("AAA", &sell_sequence());
    let signals = engine().scan(&events).unwrap();

    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].index, 25);

    let countdown = &signals[0].signal;
    assert_eq!(countdown.direction, SignalDirection::Sell);
    assert_eq!(countdown.high, 122.0);
    assert_eq!(countdown.risk_level().unwrap(), 124.0);

    let setup = countdown.setup.as_ref().unwrap();
    assert_eq!(setup.direction, SignalDirection::Sell);
    assert_eq!(setup.flip.direction, FlipDirection::Bull);
}

#[test]
fn test_no_signal_on_any_prefix() {
    let events = bars("AAA", &buy_sequence());
    for len in 0..events.len() {
        assert!(engine().scan(&events[..len]).unwrap().is_empty(), "prefix {len}");
    }
}

#[test]
fn test_stalled_countdown_grows_its_window() {
    let mut closes = buy_sequence();
    closes.truncate(14);
    // one bar (88.5) fails to reach the low two bars back
    closes.extend([90.0, 89.0, 88.0, 88.5]);
    closes.extend((0..9).map(|i| 87.0 - i as f64));
    let events = bars("AAA", &closes);

    let signals = engine().scan(&events).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].index, 26);

    let countdown = &signals[0].signal;
    assert_eq!(countdown.bars.len(), 14);
    assert_eq!(countdown.qualifying_positions.len(), 13);
    assert!(!countdown.qualifying_positions.contains(&4));
    assert_eq!(countdown.qualifier().unwrap().close, 84.0);
}

#[test]
fn test_huge_countdown_period_is_rejected() {
    let config = SequentialConfig {
        countdown_period: Period::new(4_611_686_018_427_387_903).unwrap(),
        ..SequentialConfig::default()
    };
    assert!(matches!(
        Sequential::<Bar>::new(config.clone()),
        Err(SequenceError::InvalidConfig(_))
    ));
    assert!(SequentialMap::<Bar>::with_config(config).is_err());
}

#[test]
fn test_flat_market_is_silent() {
    let events = bars("FLAT", &[50.0; 60]);
    let mut detector = engine();
    assert!(detector.scan(&events).unwrap().is_empty());
    assert_eq!(detector.phase(), Phase::AwaitingFlip);
}

#[test]
fn test_deterministic_replay() {
    let mut closes = sell_sequence();
    closes.extend(buy_sequence());
    let events = bars("AAA", &closes);

    let summarise = |signals: Vec<Indexed<CountdownSignal<Bar>>>| {
        signals
            .into_iter()
            .map(|s| (s.index, s.signal.direction, s.signal.qualifying_positions))
            .collect::<Vec<_>>()
    };

    let first = summarise(engine().scan(&events).unwrap());
    let second = summarise(engine().scan(&events).unwrap());
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_instruments_are_isolated() {
    let aaa = bars("AAA", &buy_sequence());
    let bbb = bars("BBB", &sell_sequence());
    let mut map = SequentialMap::<Bar>::with_config(SequentialConfig::default()).unwrap();

    let mut emitted = Vec::new();
    for (a, b) in aaa.iter().zip(&bbb) {
        if let Some(signal) = map.update(a).unwrap() {
            emitted.push((a.instrument.clone(), a.timestamp, signal.direction));
        }
        if let Some(signal) = map.update(b).unwrap() {
            emitted.push((b.instrument.clone(), b.timestamp, signal.direction));
        }
    }

    assert_eq!(
        emitted,
        vec![
            ("AAA".to_string(), 25, SignalDirection::Buy),
            ("BBB".to_string(), 25, SignalDirection::Sell),
        ]
    );
    assert_eq!(map.len(), 2);
}

#[test]
fn test_malformed_bar_halts_only_its_instrument() {
    let mut map = SequentialMap::<Bar>::with_config(SequentialConfig::default()).unwrap();

    let mut broken = bar("BAD", 0, 10.0);
    broken.high = f64::NAN;
    assert!(matches!(
        map.update(&broken),
        Err(SequenceError::MalformedBar { field: PriceField::High, .. })
    ));
    assert!(map.is_halted("BAD"));
    assert!(matches!(
        map.update(&bar("BAD", 1, 10.0)),
        Err(SequenceError::InstrumentHalted(_))
    ));

    let good = bars("GOOD", &buy_sequence());
    let signals: Vec<_> = good.iter().filter_map(|b| map.update(b).unwrap()).collect();
    assert_eq!(signals.len(), 1);
}

#[test]
fn test_parallel_scan_matches_serial() {
    let aaa = bars("AAA", &buy_sequence());
    let bbb = bars("BBB", &sell_sequence());
    let flat = bars("FLAT", &[50.0; 30]);
    let instruments: Vec<(&str, &[Bar])> = vec![("AAA", &aaa), ("BBB", &bbb), ("FLAT", &flat)];

    let (results, errors) = scan_parallel(&SequentialConfig::default(), instruments).unwrap();
    assert!(errors.is_empty());
    assert_eq!(results.len(), 3);

    for result in &results {
        let expected = match result.instrument.as_str() {
            "AAA" => engine().scan(&aaa).unwrap(),
            "BBB" => engine().scan(&bbb).unwrap(),
            _ => engine().scan(&flat).unwrap(),
        };
        let got: Vec<_> = result.signals.iter().map(|s| (s.index, s.signal.direction)).collect();
        let want: Vec<_> = expected.iter().map(|s| (s.index, s.signal.direction)).collect();
        assert_eq!(got, want);
    }
}

#[test]
fn test_config_from_toml_drives_fields() {
    // closes stay flat, the opens carry the whole sequence
    let config = SequentialConfig::from_toml(r#"flip_field = "open""#).unwrap();
    let events: Vec<Bar> = buy_sequence()
        .iter()
        .enumerate()
        .map(|(i, &o)| Bar::new("AAA", i as i64, o, o + 1.0, o - 1.0, 200.0, 0.0))
        .collect();

    assert_eq!(Sequential::new(config).unwrap().scan(&events).unwrap().len(), 1);
    assert!(engine().scan(&events).unwrap().is_empty());
}

#[test]
fn test_signal_json_roundtrip() {
    let events = bars("AAA", &buy_sequence());
    let signals = engine().scan(&events).unwrap();
    let signal = &signals[0].signal;

    let json = serde_json::to_string(signal).unwrap();
    let parsed: CountdownSignal<Bar> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.direction, signal.direction);
    assert_eq!(parsed.bars, signal.bars);
    assert_eq!(parsed.qualifying_positions, signal.qualifying_positions);
    assert_eq!(parsed.risk_level().unwrap(), 88.0);
    assert!(parsed.setup.unwrap().is_perfect());
}

/// Caller-defined bar type carrying its own identity
#[derive(Debug, Clone)]
struct Tick {
    symbol: &'static str,
    seq: i64,
    price: f64,
}

impl OHLCV for Tick {
    fn open(&self) -> f64 {
        self.price
    }

    fn high(&self) -> f64 {
        self.price + 0.5
    }

    fn low(&self) -> f64 {
        self.price - 0.5
    }

    fn close(&self) -> f64 {
        self.price
    }

    fn volume(&self) -> f64 {
        0.0
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.seq)
    }

    fn instrument(&self) -> &str {
        self.symbol
    }
}

#[test]
fn test_custom_bar_type() {
    let ticks: Vec<Tick> = buy_sequence()
        .iter()
        .enumerate()
        .map(|(i, &price)| Tick { symbol: "T", seq: i as i64, price })
        .collect();

    let mut map = SequentialMap::<Tick>::with_config(SequentialConfig::default()).unwrap();
    let emitted: Vec<i64> = ticks
        .iter()
        .filter_map(|t| map.update(t).unwrap().map(|_| t.seq))
        .collect();
    assert_eq!(emitted, vec![25]);
    assert!(map.get("T").is_some());
}
