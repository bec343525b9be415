use earlystop_gate::ValidationWindow;

#[test]
fn test_window_keeps_last_capacity_values() {
    let pushed: Vec<f64> = (1..=11).map(|i| 1.0 / i as f64).collect();

    for capacity in 1..=5 {
        let mut window = ValidationWindow::new(capacity);
        for (n, value) in pushed.iter().enumerate() {
            window.push(*value);
            let seen = n + 1;
            if seen >= capacity {
                assert_eq!(window.len(), capacity);
                assert_eq!(window.values(), pushed[seen - capacity..seen].to_vec());
            } else {
                assert_eq!(window.values(), pushed[..seen].to_vec());
            }
        }
    }
}

#[test]
fn test_window_is_oldest_first() {
    let mut window = ValidationWindow::new(3);
    for value in [0.9, 0.8, 0.7, 0.6] {
        window.push(value);
    }
    assert_eq!(window.iter().next(), Some(0.8));
    assert_eq!(window.latest(), Some(0.6));
}

#[test]
fn test_empty_window() {
    let window = ValidationWindow::new(4);
    assert!(window.is_empty());
    assert_eq!(window.latest(), None);
    assert_eq!(window.padded(), vec![0.0; 4]);
}
