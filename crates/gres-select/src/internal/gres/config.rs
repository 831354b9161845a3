use serde::{Deserialize, Serialize};
use std::str::FromStr;

bitflags::bitflags! {
    /// Cluster-wide selection parameters that influence device picking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SelectTypeFlags: u32 {
        /// Order shared device candidates by their idle fraction
        const LL_SHARED_GRES           = 0b00000001;
        /// Allow a job to spread shared requests over several sharing devices
        const MULTIPLE_SHARING_GRES_PJ = 0b00000010;
    }
}

bitflags::bitflags! {
    /// Job-level flags, read but never modified during selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct JobGresFlags: u32 {
        /// Devices have to be on sockets with cores allocated to the job
        const ENFORCE_BIND         = 0b00000001;
        /// Every task gets a distinct sharing device
        const ONE_TASK_PER_SHARING = 0b00000010;
    }
}

bitflags::bitflags! {
    /// Per device type configuration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GresConfigFlags: u32 {
        /// Fractional device carved from a sharing device (e.g. shards of a GPU)
        const SHARED      = 0b00000001;
        /// Physical device that shared devices are carved from
        const SHARING     = 0b00000010;
        /// Only one sharing device of the node may be used by shared requests at a time
        const ONE_SHARING = 0b00000100;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectConfig {
    pub flags: SelectTypeFlags,
}

impl SelectConfig {
    pub fn new(flags: SelectTypeFlags) -> Self {
        SelectConfig { flags }
    }

    #[inline]
    pub fn least_loaded_shared(&self) -> bool {
        self.flags.contains(SelectTypeFlags::LL_SHARED_GRES)
    }

    #[inline]
    pub fn multiple_sharing_per_job(&self) -> bool {
        self.flags.contains(SelectTypeFlags::MULTIPLE_SHARING_GRES_PJ)
    }
}

impl FromStr for SelectTypeFlags {
    type Err = std::convert::Infallible;

    /// Parses a comma separated parameter list, e.g. `CR_Core_Memory,CR_LL_SHARED_GRES`.
    /// Tokens that do not influence device selection are skipped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = SelectTypeFlags::empty();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_uppercase().as_str() {
                "CR_LL_SHARED_GRES" | "LL_SHARED_GRES" => flags |= SelectTypeFlags::LL_SHARED_GRES,
                "MULTIPLE_SHARING_GRES_PJ" => flags |= SelectTypeFlags::MULTIPLE_SHARING_GRES_PJ,
                _ => log::debug!("Ignoring select parameter {token}"),
            }
        }
        Ok(flags)
    }
}

impl FromStr for SelectConfig {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SelectConfig::new(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::{SelectConfig, SelectTypeFlags};

    #[test]
    fn test_parse_select_params() {
        let config: SelectConfig = "CR_Core_Memory, cr_ll_shared_gres,MULTIPLE_SHARING_GRES_PJ"
            .parse()
            .unwrap();
        assert!(config.least_loaded_shared());
        assert!(config.multiple_sharing_per_job());

        let config: SelectConfig = "CR_Socket".parse().unwrap();
        assert_eq!(config.flags, SelectTypeFlags::empty());
        assert!(!config.least_loaded_shared());
    }

    #[test]
    fn test_parse_empty_params() {
        let flags: SelectTypeFlags = "".parse().unwrap();
        assert!(flags.is_empty());
        let flags: SelectTypeFlags = ",,MULTIPLE_SHARING_GRES_PJ,".parse().unwrap();
        assert_eq!(flags, SelectTypeFlags::MULTIPLE_SHARING_GRES_PJ);
    }
}
