use regex::Regex;

/// One row of `netcfg` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceState {
    pub name: String,
    pub up: bool,
    pub address: String,
}

impl InterfaceState {
    /// A usable data path: up, not loopback, with an assigned address.
    pub fn is_connected(&self) -> bool {
        self.up && self.name != "lo" && self.address != "0.0.0.0"
    }
}

pub fn parse_netcfg(output: &str) -> Vec<InterfaceState> {
    let Ok(row_re) = Regex::new(r"^(\S+)\s+(UP|DOWN)\s+(\d{1,3}(?:\.\d{1,3}){3})") else {
        return Vec::new();
    };
    output
        .lines()
        .filter_map(|line| {
            let caps = row_re.captures(line.trim())?;
            Some(InterfaceState {
                name: caps[1].to_string(),
                up: &caps[2] == "UP",
                address: caps[3].to_string(),
            })
        })
        .collect()
}

pub fn has_connected_interface(output: &str) -> bool {
    parse_netcfg(output).iter().any(InterfaceState::is_connected)
}

/// Entry names from `ls`. Errors printed by toolbox `ls` (missing or
/// unreadable paths) yield no entries.
pub fn parse_ls(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.ends_with("No such file or directory"))
        .filter(|line| !line.ends_with("Permission denied"))
        .map(str::to_string)
        .collect()
}

/// True when `ps` lists a process whose name is exactly `name`.
pub fn ps_has_process(output: &str, name: &str) -> bool {
    output
        .lines()
        .skip_while(|line| line.trim_start().starts_with("USER"))
        .filter_map(|line| line.split_whitespace().last())
        .any(|process| process == name || process.rsplit('/').next() == Some(name))
}

/// Network id printed by `wpa_cli add_network`.
pub fn parse_wpa_network_id(output: &str) -> Option<u32> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .and_then(|line| line.parse::<u32>().ok())
}
