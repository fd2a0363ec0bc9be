use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    fork::Fork,
    primitives::{ChainId, Difficulty, UnixSeconds, U256},
};

const ETHEREUM_BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
const ETHEREUM_ELASTICITY_MULTIPLIER: u64 = 2;

/// Chain configuration customizable at runtime.
///
/// Fork activation times are `None` when the fork is not scheduled.
/// OP Stack chains carry an `OPTIMISM` section with their fee market parameters.
#[expect(
    clippy::struct_field_names,
    reason = "config_name starts with the same name as the struct"
)]
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub chain_id: ChainId,

    // Merge
    pub terminal_total_difficulty: Option<Difficulty>,

    // Ethereum forks
    pub shanghai_time: Option<UnixSeconds>,
    pub cancun_time: Option<UnixSeconds>,
    pub prague_time: Option<UnixSeconds>,
    pub osaka_time: Option<UnixSeconds>,

    // OP Stack upgrades
    pub canyon_time: Option<UnixSeconds>,
    pub holocene_time: Option<UnixSeconds>,
    pub isthmus_time: Option<UnixSeconds>,

    pub optimism: Option<OptimismConfig>,
}

impl Default for Config {
    fn default() -> Self {
        // Use `default` as the default `config_name` so that custom networks are never mistaken
        // for a built-in one when `CONFIG_NAME` is omitted.
        Self {
            config_name: Cow::Borrowed("default"),
            chain_id: 1,
            terminal_total_difficulty: None,
            shanghai_time: None,
            cancun_time: None,
            prague_time: None,
            osaka_time: None,
            canyon_time: None,
            holocene_time: None,
            isthmus_time: None,
            optimism: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct OptimismConfig {
    pub eip1559_elasticity: u64,
    pub eip1559_denominator: u64,
    pub eip1559_denominator_canyon: Option<u64>,
}

impl Default for OptimismConfig {
    fn default() -> Self {
        Self {
            eip1559_elasticity: 6,
            eip1559_denominator: 50,
            eip1559_denominator_canyon: Some(250),
        }
    }
}

impl Config {
    #[must_use]
    pub fn op_mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("op-mainnet"),
            chain_id: 10,
            terminal_total_difficulty: Some(U256::zero()),
            shanghai_time: Some(1_704_992_401),
            cancun_time: Some(1_710_374_401),
            prague_time: Some(1_746_806_401),
            canyon_time: Some(1_704_992_401),
            holocene_time: Some(1_736_445_601),
            isthmus_time: Some(1_746_806_401),
            optimism: Some(OptimismConfig::default()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ethereum_mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            chain_id: 1,
            terminal_total_difficulty: Some(U256::from(58_750_000_000_000_000_000_000_u128)),
            shanghai_time: Some(1_681_338_455),
            cancun_time: Some(1_710_338_135),
            prague_time: Some(1_746_612_311),
            ..Self::default()
        }
    }

    /// OP Stack devnet with every fork and upgrade active from genesis.
    #[must_use]
    pub fn optimism_devnet() -> Self {
        Self {
            config_name: Cow::Borrowed("optimism-devnet"),
            chain_id: 901,
            terminal_total_difficulty: Some(U256::zero()),
            shanghai_time: Some(0),
            cancun_time: Some(0),
            prague_time: Some(0),
            canyon_time: Some(0),
            holocene_time: Some(0),
            isthmus_time: Some(0),
            optimism: Some(OptimismConfig {
                eip1559_elasticity: 50,
                eip1559_denominator: 10,
                eip1559_denominator_canyon: Some(250),
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn ethereum_devnet() -> Self {
        Self {
            config_name: Cow::Borrowed("ethereum-devnet"),
            chain_id: 1337,
            terminal_total_difficulty: Some(U256::zero()),
            shanghai_time: Some(0),
            cancun_time: Some(0),
            prague_time: Some(0),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.config_name.is_empty() {
            return Err(Error::NameEmpty);
        }

        for character in self.config_name.chars() {
            if !matches!(character, 'a'..='z' | '0'..='9' | '-') {
                return Err(Error::NameContainsIllegalCharacters);
            }
        }

        let mut previous = (Fork::Paris, Some(0));

        for fork in enum_iterator::all::<Fork>().skip(1) {
            let time = self.fork_time(fork);

            match (previous, time) {
                ((_, None), Some(_)) => {
                    return Err(Error::ForkScheduledAfterUnscheduled {
                        fork,
                        previous: previous.0,
                    });
                }
                ((_, Some(previous_time)), Some(time)) if time < previous_time => {
                    return Err(Error::ForkOutOfOrder {
                        fork: fork.as_ref().to_owned(),
                        previous: previous.0.as_ref().to_owned(),
                    });
                }
                _ => {}
            }

            previous = (fork, time);
        }

        let upgrades = [
            ("canyon", self.canyon_time),
            ("holocene", self.holocene_time),
            ("isthmus", self.isthmus_time),
        ];

        if self.optimism.is_none() && upgrades.iter().any(|(_, time)| time.is_some()) {
            return Err(Error::UpgradeWithoutOptimism);
        }

        if let Some(optimism) = self.optimism {
            if self.canyon_time.is_some() && optimism.eip1559_denominator_canyon.unwrap_or(0) == 0 {
                return Err(Error::CanyonDenominatorMissing);
            }
        }

        for window in upgrades.windows(2) {
            let [(previous_name, previous_time), (name, time)] = window else {
                continue;
            };

            match (previous_time, time) {
                (None, Some(_)) => {
                    return Err(Error::ForkOutOfOrder {
                        fork: (*name).to_owned(),
                        previous: (*previous_name).to_owned(),
                    });
                }
                (Some(previous_time), Some(time)) if time < previous_time => {
                    return Err(Error::ForkOutOfOrder {
                        fork: (*name).to_owned(),
                        previous: (*previous_name).to_owned(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Activation time of `fork`. The Paris fork has no timestamp and is treated as genesis.
    #[must_use]
    pub const fn fork_time(&self, fork: Fork) -> Option<UnixSeconds> {
        match fork {
            Fork::Paris => Some(0),
            Fork::Shanghai => self.shanghai_time,
            Fork::Cancun => self.cancun_time,
            Fork::Prague => self.prague_time,
            Fork::Osaka => self.osaka_time,
        }
    }

    #[must_use]
    pub fn latest_fork(&self, time: UnixSeconds) -> Fork {
        enum_iterator::reverse_all::<Fork>()
            .find(|fork| is_active(self.fork_time(*fork), time))
            .unwrap_or(Fork::Paris)
    }

    #[must_use]
    pub fn is_fork_active(&self, fork: Fork, time: UnixSeconds) -> bool {
        is_active(self.fork_time(fork), time)
    }

    #[must_use]
    pub const fn is_shanghai(&self, time: UnixSeconds) -> bool {
        is_active(self.shanghai_time, time)
    }

    #[must_use]
    pub const fn is_cancun(&self, time: UnixSeconds) -> bool {
        is_active(self.cancun_time, time)
    }

    #[must_use]
    pub const fn is_prague(&self, time: UnixSeconds) -> bool {
        is_active(self.prague_time, time)
    }

    #[must_use]
    pub const fn is_osaka(&self, time: UnixSeconds) -> bool {
        is_active(self.osaka_time, time)
    }

    #[must_use]
    pub const fn is_canyon(&self, time: UnixSeconds) -> bool {
        self.is_optimism() && is_active(self.canyon_time, time)
    }

    #[must_use]
    pub const fn is_holocene(&self, time: UnixSeconds) -> bool {
        self.is_optimism() && is_active(self.holocene_time, time)
    }

    #[must_use]
    pub const fn is_isthmus(&self, time: UnixSeconds) -> bool {
        self.is_optimism() && is_active(self.isthmus_time, time)
    }

    #[must_use]
    pub const fn is_optimism(&self) -> bool {
        self.optimism.is_some()
    }

    /// Denominator of the base fee change per block before any Holocene override.
    #[must_use]
    pub fn base_fee_change_denominator(&self, time: UnixSeconds) -> u64 {
        match self.optimism {
            Some(optimism) if self.is_canyon(time) => optimism
                .eip1559_denominator_canyon
                .filter(|denominator| *denominator != 0)
                .unwrap_or(optimism.eip1559_denominator),
            Some(optimism) => optimism.eip1559_denominator,
            None => ETHEREUM_BASE_FEE_CHANGE_DENOMINATOR,
        }
    }

    #[must_use]
    pub fn elasticity_multiplier(&self) -> u64 {
        self.optimism
            .map(|optimism| optimism.eip1559_elasticity)
            .unwrap_or(ETHEREUM_ELASTICITY_MULTIPLIER)
    }
}

const fn is_active(activation: Option<UnixSeconds>, time: UnixSeconds) -> bool {
    match activation {
        Some(activation) => activation <= time,
        None => false,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration name is empty")]
    NameEmpty,
    #[error("configuration name contains illegal characters")]
    NameContainsIllegalCharacters,
    #[error("{fork} is scheduled but {previous} is not")]
    ForkScheduledAfterUnscheduled { fork: Fork, previous: Fork },
    #[error("{fork} activates before {previous}")]
    ForkOutOfOrder { fork: String, previous: String },
    #[error("OP Stack upgrades are scheduled without an OPTIMISM section")]
    UpgradeWithoutOptimism,
    #[error("Canyon is scheduled but EIP1559_DENOMINATOR_CANYON is missing or zero")]
    CanyonDenominatorMissing,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Config::op_mainnet())]
    #[test_case(Config::ethereum_mainnet())]
    #[test_case(Config::optimism_devnet())]
    #[test_case(Config::ethereum_devnet())]
    fn config_is_valid(config: Config) -> Result<(), Error> {
        config.validate()
    }

    #[test_case(1_710_374_400 => Fork::Shanghai)]
    #[test_case(1_710_374_401 => Fork::Cancun)]
    #[test_case(1_746_806_401 => Fork::Prague)]
    #[test_case(0 => Fork::Paris)]
    fn latest_fork_of_op_mainnet(time: UnixSeconds) -> Fork {
        Config::op_mainnet().latest_fork(time)
    }

    #[test]
    fn canyon_changes_the_base_fee_denominator() {
        let config = Config::op_mainnet();

        assert_eq!(config.base_fee_change_denominator(1_704_992_400), 50);
        assert_eq!(config.base_fee_change_denominator(1_704_992_401), 250);
        assert_eq!(config.elasticity_multiplier(), 6);

        let config = Config::ethereum_mainnet();

        assert_eq!(config.base_fee_change_denominator(u64::MAX), 8);
        assert_eq!(config.elasticity_multiplier(), 2);
    }

    #[test]
    fn upgrades_are_inactive_without_optimism() {
        let config = Config {
            holocene_time: Some(0),
            ..Config::ethereum_devnet()
        };

        assert!(!config.is_holocene(1));
        assert!(matches!(config.validate(), Err(Error::UpgradeWithoutOptimism)));
    }

    #[test]
    fn forks_must_be_ordered() {
        let config = Config {
            cancun_time: Some(10),
            prague_time: Some(5),
            ..Config::ethereum_devnet()
        };

        assert!(matches!(config.validate(), Err(Error::ForkOutOfOrder { .. })));

        let config = Config {
            shanghai_time: None,
            ..Config::ethereum_devnet()
        };

        assert!(matches!(
            config.validate(),
            Err(Error::ForkScheduledAfterUnscheduled {
                fork: Fork::Cancun,
                previous: Fork::Shanghai,
            }),
        ));

        let config = Config {
            holocene_time: None,
            ..Config::optimism_devnet()
        };

        assert!(matches!(config.validate(), Err(Error::ForkOutOfOrder { .. })));
    }

    #[test_case("" => matches Err(Error::NameEmpty))]
    #[test_case("My Net" => matches Err(Error::NameContainsIllegalCharacters))]
    #[test_case("my-net-2" => matches Ok(()))]
    fn config_name_is_checked(name: &'static str) -> Result<(), Error> {
        Config {
            config_name: Cow::Borrowed(name),
            ..Config::ethereum_devnet()
        }
        .validate()
    }

    #[test]
    fn config_is_read_from_yaml() -> anyhow::Result<()> {
        let yaml = "
            CONFIG_NAME: custom-op
            CHAIN_ID: 4242
            TERMINAL_TOTAL_DIFFICULTY: '0x0'
            SHANGHAI_TIME: 0
            CANYON_TIME: 0
            HOLOCENE_TIME: 100
            OPTIMISM:
              EIP1559_ELASTICITY: 10
              EIP1559_DENOMINATOR: 50
        ";

        let config = serde_yaml::from_str::<Config>(yaml)?;

        config.validate()?;

        assert_eq!(config.chain_id, 4242);
        assert_eq!(config.terminal_total_difficulty, Some(U256::zero()));
        assert_eq!(config.cancun_time, None);
        assert!(!config.is_holocene(99));
        assert!(config.is_holocene(100));
        assert_eq!(config.elasticity_multiplier(), 10);
        assert_eq!(config.base_fee_change_denominator(0), 250);

        let round_trip = serde_yaml::from_str::<Config>(&serde_yaml::to_string(&config)?)?;

        assert_eq!(round_trip, config);

        Ok(())
    }
}
