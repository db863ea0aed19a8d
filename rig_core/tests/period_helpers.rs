// Rate and duration helpers used by the sampler and the CLI.
use rig_core::util::{as_millis_u64, period_ms, period_us};
use rstest::rstest;
use std::time::Duration;

#[rstest]
#[case(1, 1_000_000)]
#[case(2, 500_000)]
#[case(20, 50_000)]
#[case(1_000_000, 1)]
#[case(u32::MAX, 1)]
fn period_us_floors_at_one_microsecond(#[case] hz: u32, #[case] want: u64) {
    assert_eq!(period_us(hz), want);
}

#[rstest]
#[case(1, 1000)]
#[case(20, 50)]
#[case(1000, 1)]
#[case(10_000, 1)]
fn period_ms_floors_at_one_millisecond(#[case] hz: u32, #[case] want: u64) {
    assert_eq!(period_ms(hz), want);
}

#[test]
fn zero_hz_is_treated_as_one() {
    assert_eq!(period_us(0), 1_000_000);
    assert_eq!(period_ms(0), 1000);
}

#[test]
fn millis_saturate() {
    assert_eq!(as_millis_u64(Duration::from_micros(2_999)), 2);
    assert_eq!(as_millis_u64(Duration::MAX), u64::MAX);
}
