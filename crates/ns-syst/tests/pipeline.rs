use approx::assert_relative_eq;
use ns_core::traits::Smoother;
use ns_core::{BinnedSeries, Error};
use ns_syst::batch::{SmoothJob, smooth_batch};
use ns_syst::smooth::{AdaptiveMergeSmoother, ErrorPolicy, SmoothingConfig, SmoothingMethod, smooth};
use ns_syst::symmetrize::SymmetrizationType;
use ns_syst::{SystematicTreatment, process_systematic};

fn template(scale: f64) -> Vec<f64> {
    (0..12).map(|i| scale * (500.0 * (-0.2 * i as f64).exp() + 20.0)).collect()
}

fn noisy(base: &[f64], amp: f64) -> Vec<f64> {
    base.iter()
        .enumerate()
        .map(|(i, b)| b * (1.0 + amp * if i % 2 == 0 { 1.0 } else { -0.6 }))
        .collect()
}

#[test]
fn end_to_end_monotonic_merge() {
    let nom = BinnedSeries::with_unit_bins(vec![100.0; 4], vec![10.0; 4]).unwrap();
    let var = BinnedSeries::with_unit_bins(vec![105.0, 95.0, 110.0, 90.0], vec![10.0; 4]).unwrap();
    let smoother = AdaptiveMergeSmoother::monotonic().with_stat_error_threshold(0.2);
    let out = smoother.smooth(&nom, &var).unwrap();

    assert_relative_eq!(out.integral(), 400.0, max_relative = 1e-12);
    let ratios: Vec<f64> = out.contents().iter().zip(nom.contents()).map(|(o, n)| o / n).collect();
    let rising = ratios.windows(2).all(|w| w[1] >= w[0] - 1e-12);
    let falling = ratios.windows(2).all(|w| w[1] <= w[0] + 1e-12);
    assert!(rising || falling, "{:?}", ratios);
}

#[test]
fn legacy_tags_dispatch_like_canonical_names() {
    let nom = BinnedSeries::with_sqrt_errors(template(1.0)).unwrap();
    let var = BinnedSeries::with_sqrt_errors(noisy(&template(1.0), 0.05)).unwrap();
    for method in SmoothingMethod::ALL {
        let json = format!(r#"{{"method": "{}"}}"#, method.legacy_tag());
        let legacy = SmoothingConfig::from_json_str(&json).unwrap();
        assert_eq!(legacy.method, method);
        let a = smooth(&nom, &var, &legacy).unwrap();
        let b = smooth(&nom, &var, &SmoothingConfig::new(method)).unwrap();
        assert_eq!(a, b, "{}", method);
    }
}

#[test]
fn unknown_tag_and_propagated_policy_fail() {
    let err = SmoothingConfig::from_json_str(r#"{"method": "smoothSomethingElse"}"#).unwrap_err();
    assert!(matches!(err, Error::UnsupportedConfiguration(_)), "{:?}", err);

    let nom = BinnedSeries::with_sqrt_errors(template(1.0)).unwrap();
    let cfg = SmoothingConfig::new(SmoothingMethod::TChannel)
        .with_error_policy(ErrorPolicy::Propagated);
    let err = smooth(&nom, &nom, &cfg).unwrap_err();
    assert!(matches!(err, Error::UnsupportedConfiguration(_)), "{:?}", err);
}

#[test]
fn inputs_are_not_modified() {
    let nom = BinnedSeries::with_sqrt_errors(template(1.0)).unwrap();
    let up = BinnedSeries::with_sqrt_errors(noisy(&template(1.0), 0.08)).unwrap();
    let down = BinnedSeries::with_sqrt_errors(noisy(&template(1.0), -0.08)).unwrap();
    let (nom0, up0, down0) = (nom.clone(), up.clone(), down.clone());

    let t = SystematicTreatment::new(
        SymmetrizationType::TwoSided,
        Some(SmoothingConfig::new(SmoothingMethod::MaxVariation)),
    );
    let (u, d) = process_systematic(&nom, &up, Some(&down), &t).unwrap();
    assert_eq!(nom, nom0);
    assert_eq!(up, up0);
    assert_eq!(down, down0);
    assert_eq!(u.n_bins(), nom.n_bins());
    assert_eq!(d.n_bins(), nom.n_bins());
}

#[test]
fn one_sided_smooths_then_mirrors() {
    let nom = BinnedSeries::with_sqrt_errors(template(4.0)).unwrap();
    let up = BinnedSeries::with_sqrt_errors(noisy(&template(4.0), 0.05)).unwrap();
    let cfg = SmoothingConfig::new(SmoothingMethod::TtresDependent)
        .with_error_policy(ErrorPolicy::KeepOriginal);
    let t = SystematicTreatment::new(SymmetrizationType::OneSided, Some(cfg.clone()));
    let (u, d) = process_systematic(&nom, &up, None, &t).unwrap();

    let smoothed = smooth(&nom, &up, &cfg).unwrap();
    assert_eq!(u.errors(), up.errors());
    for i in 0..nom.n_bins() {
        assert_relative_eq!(u.content(i), smoothed.content(i), max_relative = 1e-9);
        let expected = (2.0 * nom.content(i) - u.content(i)).max(0.0);
        assert_relative_eq!(d.content(i), expected, max_relative = 1e-12);
    }
}

#[test]
fn batch_smoothing_matches_serial() {
    let nom = BinnedSeries::with_sqrt_errors(template(2.0)).unwrap();
    let vars: Vec<BinnedSeries> = (1..=6)
        .map(|k| BinnedSeries::with_sqrt_errors(noisy(&template(2.0), 0.02 * k as f64)).unwrap())
        .collect();
    let configs: Vec<SmoothingConfig> =
        SmoothingMethod::ALL.iter().map(|m| SmoothingConfig::new(*m)).collect();

    let mut jobs = Vec::new();
    for v in &vars {
        for c in &configs {
            jobs.push(SmoothJob { nominal: &nom, variation: v, config: c });
        }
    }
    let out = smooth_batch(&jobs);
    assert_eq!(out.len(), jobs.len());
    for (job, res) in jobs.iter().zip(out) {
        assert_eq!(res.unwrap(), smooth(job.nominal, job.variation, job.config).unwrap());
    }
}
