#[derive(Default, Clone)]
pub struct Candidates {
    pub(crate) trickle: bool,
}

/// SettingEngine allows influencing behavior in ways that are not
/// supported by the WebRTC API. This allows us to support additional
/// use-cases without deviating from the WebRTC API elsewhere.
#[derive(Default, Clone)]
pub struct SettingEngine {
    pub(crate) candidates: Candidates,
}

impl SettingEngine {
    /// set_trickle controls whether the ice agent signals candidates as it
    /// discovers them instead of gathering synchronously before the offer or
    /// answer is produced.
    pub fn set_trickle(&mut self, trickle: bool) {
        self.candidates.trickle = trickle;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_set_trickle() {
        let mut s = SettingEngine::default();
        assert!(!s.candidates.trickle);

        s.set_trickle(true);
        assert!(s.candidates.trickle);
    }
}
