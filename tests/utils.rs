use tasksync::utils::color::{is_hex_color, normalize_color, palette_color};
use tasksync::utils::datetime::{days_to_millis, days_until, format_timestamp, millis_to_secs_ceil, DAY_MS};

#[test]
fn test_hex_color_validation() {
    assert!(is_hex_color("#ef4444"));
    assert!(is_hex_color("#ABCDEF"));
    assert!(!is_hex_color("ef4444"));
    assert!(!is_hex_color("#ef444"));
    assert!(!is_hex_color("#gggggg"));
}

#[test]
fn test_normalize_color() {
    assert_eq!(normalize_color("Red"), palette_color("red").map(str::to_string));
    assert_eq!(normalize_color("ABCDEF"), Some("#abcdef".to_string()));
    assert_eq!(normalize_color(" #123456 "), Some("#123456".to_string()));
    assert_eq!(normalize_color("chartreuse"), None);
}

#[test]
fn test_days_until_rounds_up() {
    assert_eq!(days_until(DAY_MS, 0), 1);
    assert_eq!(days_until(DAY_MS + 1, 0), 2);
    assert_eq!(days_until(0, DAY_MS), 0);
    assert_eq!(days_to_millis(90), 90 * DAY_MS);
}

#[test]
fn test_millis_to_secs_ceil() {
    assert_eq!(millis_to_secs_ceil(0), 0);
    assert_eq!(millis_to_secs_ceil(1), 1);
    assert_eq!(millis_to_secs_ceil(1_000), 1);
    assert_eq!(millis_to_secs_ceil(1_001), 2);
    assert_eq!(millis_to_secs_ceil(-5), 0);
}

#[test]
fn test_format_timestamp() {
    assert_eq!(format_timestamp(None), "never");
    assert_eq!(format_timestamp(Some(i64::MAX)), "invalid");
    assert_eq!(format_timestamp(Some(0)).len(), "1970-01-01 00:00".len());
}
