use approx::assert_abs_diff_eq;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use swrdecode::replay::{correlate_event, correlate_events, detect_replays};
use swrdecode::{
    AnalysisConfig, Epoch, Exclusivity, NeuronEnsemble, PercentileKind, PlaceOrder, SpikeTrain,
    Trajectory, TuningCurves,
};

fn order_for_peaks(peaks: &[Option<usize>]) -> PlaceOrder {
    let mut rates = Array2::<f64>::zeros((peaks.len(), 100));
    for (i, p) in peaks.iter().enumerate() {
        if let Some(b) = *p {
            rates[[i, b]] = 10.0;
        }
    }
    PlaceOrder::from_tuning_curves(&TuningCurves::new(rates, 100).unwrap())
}

fn ensemble(spikes: Vec<Vec<f64>>) -> NeuronEnsemble {
    NeuronEnsemble::new(
        spikes
            .into_iter()
            .enumerate()
            .map(|(i, mut s)| {
                s.sort_by(f64::total_cmp);
                SpikeTrain::new(format!("n{i}"), s).unwrap()
            })
            .collect(),
    )
}

#[test]
fn three_neurons_in_place_order() {
    let order = order_for_peaks(&[Some(10), Some(50), Some(90)]);
    let ens = ensemble(vec![vec![0.01], vec![0.02], vec![0.03]]);
    let cfg = AnalysisConfig {
        min_n_active: 3,
        n_shuffles: 100,
        percentile_kind: PercentileKind::Weak,
        ..Default::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let r = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut rng);
    assert_abs_diff_eq!(r.correlation, 1.0, epsilon = 1e-12);
    assert_eq!(r.n_active, 3);
    assert_eq!(r.shuffled.len(), 101);
    assert!(r.percentile >= 95.0);
}

#[test]
fn bursting_neurons_in_place_order() {
    let order = order_for_peaks(&[Some(10), Some(50), Some(90), Some(95)]);
    let spikes = (0..4)
        .map(|n| (0..3).map(|k| 0.03 * n as f64 + 0.005 * k as f64 + 0.001).collect())
        .collect();
    let ens = ensemble(spikes);
    let cfg = AnalysisConfig { n_shuffles: 100, ..Default::default() };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let r = correlate_event(&ens, &order, 0.0, 0.2, &cfg, &mut rng);
    assert_abs_diff_eq!(r.correlation, 1.0, epsilon = 1e-12);
    assert!(r.percentile >= 95.0, "percentile {}", r.percentile);
}

#[test]
fn reverse_order_is_significant_too() {
    let order = order_for_peaks(&[Some(10), Some(30), Some(50), Some(70), Some(90)]);
    let spikes = (0..5).map(|n| vec![0.05 - 0.01 * n as f64]).collect();
    let ens = ensemble(spikes);
    let swrs = Epoch::interval(0.0, 0.1).unwrap();
    let mut orders = BTreeMap::new();
    orders.insert(Trajectory::Familiar, order);
    let cfg = AnalysisConfig { n_shuffles: 100, ..Default::default() };
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let out = detect_replays(&ens, &orders, &swrs, &cfg, &mut rng);
    let r = &out.correlations[&Trajectory::Familiar][0];
    assert_abs_diff_eq!(r.correlation, -1.0, epsilon = 1e-12);
    assert!(r.percentile <= 5.0, "percentile {}", r.percentile);
    assert_eq!(out.classification.replays(Trajectory::Familiar), &[0]);
    assert_eq!(out.classification.category_of(0), Some(Exclusivity::OnlyFamiliar));
}

#[test]
fn too_few_active_neurons_give_nan() {
    let order = order_for_peaks(&[Some(10), Some(50), Some(90), Some(95)]);
    let ens = ensemble(vec![vec![0.01], vec![0.02], vec![0.03], vec![5.0]]);
    let cfg = AnalysisConfig { n_shuffles: 20, ..Default::default() };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let r = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut rng);
    assert!(!r.is_defined());
    assert_eq!(r.n_active, 3);
    assert_eq!(r.percentile(), None);
    assert_eq!(r.shuffled.len(), 21);
    assert!(r.shuffled.iter().all(|v| v.is_nan()));
}

#[test]
fn neurons_without_a_field_do_not_count() {
    let order = order_for_peaks(&[Some(10), None, Some(50), Some(90), Some(95)]);
    let ens = ensemble((0..5).map(|n| vec![0.01 * (n + 1) as f64]).collect());
    let cfg = AnalysisConfig { n_shuffles: 10, ..Default::default() };
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let r = correlate_event(&ens, &order, 0.0, 0.1, &cfg, &mut rng);
    assert_eq!(r.n_active, 4);
    assert_abs_diff_eq!(r.correlation, 1.0, epsilon = 1e-12);
}

#[test]
fn random_events_give_calibrated_percentiles() {
    const N: usize = 8;
    const EVENTS: usize = 200;
    let order = order_for_peaks(&(0..N).map(|i| Some(5 + 10 * i)).collect::<Vec<_>>());

    let mut gen = ChaCha8Rng::seed_from_u64(99);
    let mut spikes = vec![Vec::new(); N];
    let mut starts = Vec::with_capacity(EVENTS);
    for e in 0..EVENTS {
        let t0 = e as f64;
        let mut slots: Vec<usize> = (0..N).collect();
        slots.shuffle(&mut gen);
        for (neuron, slot) in slots.into_iter().enumerate() {
            spikes[neuron].push(t0 + 0.01 * (slot + 1) as f64);
        }
        starts.push(t0);
    }
    let stops: Vec<f64> = starts.iter().map(|s| s + 0.1).collect();
    let swrs = Epoch::from_pairs(&starts, &stops).unwrap();
    let ens = ensemble(spikes);

    let cfg = AnalysisConfig { n_shuffles: 100, ..Default::default() };
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let results = correlate_events(&ens, &order, &swrs, &cfg, &mut rng);
    assert_eq!(results.len(), EVENTS);
    assert!(results.iter().all(|r| r.is_defined()));

    let pct: Vec<f64> = results.iter().map(|r| r.percentile).collect();
    let significant = pct.iter().filter(|&&p| p <= 5.0 || p >= 95.0).count();
    let frac = significant as f64 / EVENTS as f64;
    assert!((0.03..=0.2).contains(&frac), "significant fraction {frac}");
    let mean = pct.iter().sum::<f64>() / EVENTS as f64;
    assert!((40.0..=60.0).contains(&mean), "mean percentile {mean}");
}
