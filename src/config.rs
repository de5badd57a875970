use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Docker endpoint, e.g. `unix:///var/run/docker.sock` or
    /// `tcp://10.0.0.5:2375`. Local defaults apply when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_endpoint: Option<String>,
    /// Address this host reports its containers under.
    pub node_ip: String,
    pub report_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// Containers not reported for this long are dropped.
    pub container_ttl_secs: u64,
    pub router_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_endpoint: None,
            node_ip: "127.0.0.1".into(),
            report_interval_secs: 5,
            sweep_interval_secs: 10,
            container_ttl_secs: 30,
            router_interval_secs: 3,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("realstate.toml"))
                .merge(Json::file("realstate.json"))
                .merge(Env::prefixed("REALSTATE_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.node_ip
            .parse::<IpAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid node_ip {:?}: {}", self.node_ip, e))?;

        for (name, secs) in [
            ("report_interval_secs", self.report_interval_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("container_ttl_secs", self.container_ttl_secs),
            ("router_interval_secs", self.router_interval_secs),
        ] {
            if secs == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.container_ttl_secs > i64::MAX as u64 {
            anyhow::bail!("container_ttl_secs is out of range");
        }
        if self.container_ttl_secs < self.report_interval_secs {
            anyhow::bail!(
                "container_ttl_secs ({}) must be at least report_interval_secs ({})",
                self.container_ttl_secs,
                self.report_interval_secs
            );
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn router_interval(&self) -> Duration {
        Duration::from_secs(self.router_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::from_figment(defaults()).unwrap();
        assert_eq!(cfg.node_ip, "127.0.0.1");
        assert_eq!(cfg.container_ttl_secs, 30);
        assert_eq!(cfg.router_interval(), Duration::from_secs(3));
    }

    #[test]
    fn overrides_are_merged() {
        let cfg = Config::from_figment(
            defaults()
                .merge(Serialized::default("node_ip", "10.2.0.7"))
                .merge(Serialized::default("container_ttl_secs", 90))
                .merge(Serialized::default("docker_endpoint", "tcp://10.0.0.5:2375")),
        )
        .unwrap();
        assert_eq!(cfg.node_ip, "10.2.0.7");
        assert_eq!(cfg.container_ttl_secs, 90);
        assert_eq!(cfg.report_interval_secs, 5);
        assert_eq!(cfg.docker_endpoint.as_deref(), Some("tcp://10.0.0.5:2375"));
    }

    #[test]
    fn bad_node_ip_is_rejected() {
        let err =
            Config::from_figment(defaults().merge(Serialized::default("node_ip", "not-an-ip")));
        assert!(err.is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = Config::from_figment(
            defaults().merge(Serialized::default("sweep_interval_secs", 0)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn ttl_outside_range_is_rejected() {
        for ttl in [0, u64::MAX, 1 << 63] {
            let err = Config::from_figment(
                defaults().merge(Serialized::default("container_ttl_secs", ttl)),
            );
            assert!(err.is_err(), "ttl {} accepted", ttl);
        }
    }

    #[test]
    fn ttl_shorter_than_report_interval_is_rejected() {
        let err = Config::from_figment(
            defaults()
                .merge(Serialized::default("report_interval_secs", 20))
                .merge(Serialized::default("container_ttl_secs", 10)),
        );
        assert!(err.is_err());

        let cfg = Config::from_figment(
            defaults()
                .merge(Serialized::default("report_interval_secs", 20))
                .merge(Serialized::default("container_ttl_secs", 20)),
        )
        .unwrap();
        assert_eq!(cfg.container_ttl_secs, 20);
    }
}
