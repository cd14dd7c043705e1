use ns_core::BinnedSeries;
use ns_core::traits::Smoother;
use ns_syst::smooth::{
    FluctuationMergeSmoother, SmoothingAlgorithm, SmoothingConfig, SmoothingMethod,
};
use proptest::prelude::*;

fn algorithm(method: SmoothingMethod) -> SmoothingAlgorithm {
    SmoothingAlgorithm::from_config(&SmoothingConfig::new(method)).unwrap()
}

fn is_kernel(method: SmoothingMethod) -> bool {
    matches!(
        method,
        SmoothingMethod::DeltaBoxKernel
            | SmoothingMethod::RatioBoxKernel
            | SmoothingMethod::DeltaGaussKernel
            | SmoothingMethod::RatioGaussKernel
    )
}

fn pair(base: &[f64], shifts: &[f64]) -> (BinnedSeries, BinnedSeries) {
    let nom = BinnedSeries::with_sqrt_errors(base.to_vec()).unwrap();
    let shifted = base.iter().zip(shifts).map(|(b, s)| b * (1.0 + s)).collect();
    let var = BinnedSeries::with_sqrt_errors(shifted).unwrap();
    (nom, var)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_every_method_preserves_integral(
        n in 2usize..=24,
        base in proptest::collection::vec(10.0f64..1e3, 24),
        shifts in proptest::collection::vec(-0.2f64..0.2, 24),
    ) {
        let (nom, var) = pair(&base[..n], &shifts[..n]);
        for method in SmoothingMethod::ALL {
            let out = algorithm(method).smooth(&nom, &var).unwrap();
            prop_assert_eq!(out.n_bins(), n);
            prop_assert_eq!(out.edges(), var.edges());
            let rel = (out.integral() - var.integral()).abs() / var.integral();
            prop_assert!(
                rel < 1e-9,
                "{}: integral {} vs {}",
                method,
                out.integral(),
                var.integral()
            );
            prop_assert!(out.errors().iter().all(|e| *e == 0.0));
            if !is_kernel(method) {
                let non_negative = out.contents().iter().all(|c| *c >= 0.0);
                prop_assert!(non_negative, "{}: {:?}", method, out.contents());
            }
        }
    }

    #[test]
    fn prop_constant_ratio_is_a_fixed_point(
        n in 3usize..=16,
        base in proptest::collection::vec(10.0f64..1e3, 16),
        k in 0.5f64..1.5,
    ) {
        let nom = BinnedSeries::with_sqrt_errors(base[..n].to_vec()).unwrap();
        let var = nom.scaled(k);
        for method in SmoothingMethod::ALL {
            if matches!(
                method,
                SmoothingMethod::DeltaBoxKernel | SmoothingMethod::DeltaGaussKernel
            ) {
                continue;
            }
            let out = algorithm(method).smooth(&nom, &var).unwrap();
            for (o, v) in out.contents().iter().zip(var.contents()) {
                let close = (o - v).abs() <= 1e-9 * v.abs().max(1.0);
                prop_assert!(close, "{}: {} vs {}", method, o, v);
            }
        }
    }

    #[test]
    fn prop_single_bin_is_untouched(c in 0.0f64..1e3, v in 0.0f64..1e3, e in 0.0f64..10.0) {
        let nom = BinnedSeries::with_unit_bins(vec![c], vec![e]).unwrap();
        let var = BinnedSeries::with_unit_bins(vec![v], vec![e]).unwrap();
        for method in SmoothingMethod::ALL {
            let out = algorithm(method).smooth(&nom, &var).unwrap();
            prop_assert_eq!(&out, &var);
        }
    }

    #[test]
    fn prop_fluctuation_merges_are_bounded(
        n in 1usize..=32,
        base in proptest::collection::vec(0.0f64..1e3, 32),
        var in proptest::collection::vec(0.0f64..1e3, 32),
        independent in any::<bool>(),
    ) {
        let nom = BinnedSeries::with_sqrt_errors(base[..n].to_vec()).unwrap();
        let var = BinnedSeries::with_sqrt_errors(var[..n].to_vec()).unwrap();
        let plan = FluctuationMergeSmoother::new(independent).merge_plan(&nom, &var).unwrap();
        prop_assert!(plan.merges < n);
        prop_assert_eq!(plan.grouping.n_groups(), n - plan.merges);
    }
}
