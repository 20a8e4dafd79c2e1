use mtgate_mtproto::updates::{Difference, UpdateError, UpdateLog};

#[test]
fn difference_replays_everything_after_pts() {
    let mut log = UpdateLog::new();
    log.push_at(1, b"a".to_vec(), 10).unwrap();
    log.push_at(2, b"b".to_vec(), 11).unwrap();
    log.push_at(1, b"c".to_vec(), 12).unwrap();
    assert_eq!(log.state().pts, 5);

    let Difference::Slice { updates, state } = log.difference(2) else { panic!("expected slice") };
    let bodies: Vec<&[u8]> = updates.iter().map(|u| u.update.as_slice()).collect();
    assert_eq!(bodies, vec![&b"b"[..], &b"c"[..]]);
    assert_eq!(state.pts, 5);
    assert_eq!(state.date, 12);

    let Difference::Slice { updates, .. } = log.difference(1) else { panic!("expected slice") };
    assert_eq!(updates.len(), 3);
    assert!(matches!(log.difference(5), Difference::Empty(_)));
}

#[test]
fn evicted_history_reports_too_long() {
    let mut log = UpdateLog::with_retention(2);
    for i in 0..5u8 {
        log.push_at(1, vec![i], 100).unwrap();
    }
    assert_eq!(log.state().pts, 6);
    assert!(matches!(log.difference(1), Difference::TooLong(_)));
    assert!(matches!(log.difference(3), Difference::TooLong(_)));

    let Difference::Slice { updates, .. } = log.difference(4) else { panic!("expected slice") };
    assert_eq!(updates.iter().map(|u| u.pts).collect::<Vec<_>>(), vec![5, 6]);
}

#[test]
fn history_lost_from_the_start_reports_too_long() {
    let mut log = UpdateLog::with_retention(2);
    assert_eq!(log.push_at(0, vec![0], 100), Err(UpdateError::InvalidCount(0)));
    for i in 1..=3u8 {
        log.push_at(1, vec![i], 100).unwrap();
    }
    assert_eq!(log.state().pts, 4);

    // pts 2 was evicted, so a client at the initial pts cannot catch up.
    assert!(matches!(log.difference(0), Difference::TooLong(_)));
    assert!(matches!(log.difference(1), Difference::TooLong(_)));
    let Difference::Slice { updates, .. } = log.difference(2) else { panic!("expected slice") };
    assert_eq!(updates.iter().map(|u| u.pts).collect::<Vec<_>>(), vec![3, 4]);
}

#[test]
fn counter_overflow_is_an_error() {
    let mut log = UpdateLog::new();
    assert_eq!(log.push_at(i32::MAX, b"x".to_vec(), 1), Err(UpdateError::Overflow));
    assert_eq!(log.state().pts, 1);
    assert!(matches!(log.difference(0), Difference::Empty(_)));

    assert_eq!(log.push_at(i32::MAX - 1, b"y".to_vec(), 1), Ok(i32::MAX));
    assert_eq!(log.push_at(1, b"z".to_vec(), 2), Err(UpdateError::Overflow));
    assert_eq!(log.state().pts, i32::MAX);
}
