use huescreen_lib::StateReport;

pub type RWatchSender = tokio::sync::watch::Sender<StateReport>;
pub type RWatchReceiver = tokio::sync::watch::Receiver<StateReport>;

/// Publishes a new report, waking watchers only when it differs from
/// the last one.
pub fn publish(pub_state: &RWatchSender, new: StateReport) {
    pub_state.send_if_modified(|old: &mut StateReport| {
        if *old == new {
            false
        } else {
            *old = new;
            true
        }
    });
}
