use super::*;

#[test]
fn clones_share_the_same_request_id_and_metadata() {
    let ctx = RequestContext::new();
    let clone = ctx.clone();
    assert_eq!(ctx.request_id(), clone.request_id());

    ctx.set_metadata("tenant", "acme");
    assert_eq!(clone.metadata("tenant"), Some("acme".to_string()));
}

#[test]
fn no_deadline_never_expires() {
    let ctx = RequestContext::new();
    assert!(!ctx.is_expired());
    assert!(ctx.remaining().is_none());
}

#[test]
fn deadline_expires_after_timeout() {
    let ctx = RequestContext::with_timeout(Duration::from_millis(10));
    assert!(!ctx.is_expired());
    std::thread::sleep(Duration::from_millis(30));
    assert!(ctx.is_expired());
    assert_eq!(ctx.remaining(), Some(Duration::ZERO));
}

#[test]
fn sibling_tasks_observe_same_id_and_deadline() {
    let ctx = RequestContext::with_timeout(Duration::from_secs(1));
    let a = ctx.clone();
    let b = ctx.clone();
    assert_eq!(a.request_id(), b.request_id());
    assert_eq!(a.deadline(), b.deadline());
}
