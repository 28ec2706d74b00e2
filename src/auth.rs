use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::types::Team;

type SecretDigest = [u8; 32];

fn digest(secret: &str) -> SecretDigest {
    Sha256::digest(secret.as_bytes()).into()
}

/// Per-team shared secrets, held as SHA-256 digests only.
#[derive(Debug, Clone, Default)]
pub struct AdminGate {
    secrets: BTreeMap<Team, SecretDigest>,
}

impl AdminGate {
    pub fn from_config(config: &Config) -> Self {
        let secrets = Team::all()
            .iter()
            .filter_map(|team| config.team_secret(*team).map(|s| (*team, digest(s))))
            .collect();
        Self { secrets }
    }

    #[cfg(test)]
    pub fn with_secret(mut self, team: Team, secret: &str) -> Self {
        self.secrets.insert(team, digest(secret));
        self
    }

    pub fn has_secret(&self, team: Team) -> bool {
        self.secrets.contains_key(&team)
    }

    /// `false` for teams without a configured secret.
    pub fn verify(&self, team: Team, attempt: &str) -> bool {
        let Some(expected) = self.secrets.get(&team) else {
            return false;
        };
        let given = digest(attempt);
        expected
            .iter()
            .zip(given.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_matching_team_secret_unlocks() {
        let gate = AdminGate::default()
            .with_secret(Team::Control, "alpha")
            .with_secret(Team::East, "beta");

        assert!(gate.verify(Team::Control, "alpha"));
        assert!(!gate.verify(Team::Control, "beta"));
        assert!(!gate.verify(Team::Control, ""));
        assert!(gate.verify(Team::East, "beta"));
        assert!(!gate.verify(Team::Central, "alpha"));
        assert!(!gate.has_secret(Team::Central));
    }

    #[test]
    fn empty_secrets_in_config_are_ignored() {
        let mut config = Config::default();
        config.teams.insert("성수SO팀".into(), "".into());
        config.teams.insert("백본SO팀".into(), "pw".into());
        let gate = AdminGate::from_config(&config);
        assert!(!gate.has_secret(Team::Seongsu));
        assert!(!gate.verify(Team::Seongsu, ""));
        assert!(gate.verify(Team::Backbone, "pw"));
    }
}
