//! Core ACL enums.
//!
//! Basic keys, access commands and ACL types, with the SDK spellings used in
//! logs and configuration. Directions and attachment points live in
//! `flexacl_hw` and are re-exported here.

use std::fmt;
use std::str::FromStr;

pub use flexacl_hw::{AttachPoint, Direction, DirectionSet};

/// A logical packet field a rule can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BasicKey {
    // IPv4 fields
    SrcIp,
    DstIp,

    // IPv6 fields
    SrcIpv6,
    DstIpv6,

    // L3 fields
    IpProto,
    Dscp,
    Ecn,
    Ttl,
    IpFragmented,
    IpLength,

    // L4 fields
    L4SrcPort,
    L4DstPort,
    TcpFlags,
    L4PortRange,

    // L2 fields
    Smac,
    Dmac,
    Ethertype,
    VlanId,
    Pcp,
    InnerVlanId,

    // Port and interface fields
    SrcPort,
    RxList,
    TxList,
    IrifId,
    ErifId,

    // User-defined extraction
    CustomBytes0,
    CustomBytes1,
}

impl BasicKey {
    pub const ALL: [BasicKey; 27] = [
        BasicKey::SrcIp,
        BasicKey::DstIp,
        BasicKey::SrcIpv6,
        BasicKey::DstIpv6,
        BasicKey::IpProto,
        BasicKey::Dscp,
        BasicKey::Ecn,
        BasicKey::Ttl,
        BasicKey::IpFragmented,
        BasicKey::IpLength,
        BasicKey::L4SrcPort,
        BasicKey::L4DstPort,
        BasicKey::TcpFlags,
        BasicKey::L4PortRange,
        BasicKey::Smac,
        BasicKey::Dmac,
        BasicKey::Ethertype,
        BasicKey::VlanId,
        BasicKey::Pcp,
        BasicKey::InnerVlanId,
        BasicKey::SrcPort,
        BasicKey::RxList,
        BasicKey::TxList,
        BasicKey::IrifId,
        BasicKey::ErifId,
        BasicKey::CustomBytes0,
        BasicKey::CustomBytes1,
    ];

    /// Field code written into rule images.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Width of the field value in bits.
    pub fn width_bits(&self) -> u32 {
        match self {
            BasicKey::SrcIp | BasicKey::DstIp => 32,
            BasicKey::SrcIpv6 | BasicKey::DstIpv6 => 128,
            BasicKey::IpProto | BasicKey::Ttl | BasicKey::TcpFlags => 8,
            BasicKey::Dscp => 6,
            BasicKey::Ecn => 2,
            BasicKey::IpFragmented => 1,
            BasicKey::IpLength | BasicKey::L4SrcPort | BasicKey::L4DstPort => 16,
            BasicKey::Ethertype => 16,
            BasicKey::Smac | BasicKey::Dmac => 48,
            BasicKey::VlanId | BasicKey::InnerVlanId => 12,
            BasicKey::Pcp => 3,
            BasicKey::CustomBytes0 | BasicKey::CustomBytes1 => 32,
            // Object references: range, port list, port and interface ids.
            BasicKey::L4PortRange
            | BasicKey::SrcPort
            | BasicKey::RxList
            | BasicKey::TxList
            | BasicKey::IrifId
            | BasicKey::ErifId => 64,
        }
    }
}

impl fmt::Display for BasicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SrcIp => "SIP",
            Self::DstIp => "DIP",
            Self::SrcIpv6 => "SIPV6",
            Self::DstIpv6 => "DIPV6",
            Self::IpProto => "IP_PROTO",
            Self::Dscp => "DSCP",
            Self::Ecn => "ECN",
            Self::Ttl => "TTL",
            Self::IpFragmented => "IP_FRAGMENTED",
            Self::IpLength => "IP_LENGTH",
            Self::L4SrcPort => "L4_SOURCE_PORT",
            Self::L4DstPort => "L4_DESTINATION_PORT",
            Self::TcpFlags => "TCP_CONTROL",
            Self::L4PortRange => "L4_PORT_RANGE",
            Self::Smac => "SMAC",
            Self::Dmac => "DMAC",
            Self::Ethertype => "ETHERTYPE",
            Self::VlanId => "VLAN_ID",
            Self::Pcp => "PCP",
            Self::InnerVlanId => "INNER_VLAN_ID",
            Self::SrcPort => "SRC_PORT",
            Self::RxList => "RX_LIST",
            Self::TxList => "TX_LIST",
            Self::IrifId => "IRIF",
            Self::ErifId => "ERIF",
            Self::CustomBytes0 => "CUSTOM_BYTES_0",
            Self::CustomBytes1 => "CUSTOM_BYTES_1",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BasicKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        let alias = match upper.as_str() {
            "SRC_IP" => Some(Self::SrcIp),
            "DST_IP" => Some(Self::DstIp),
            "L4_SRC_PORT" => Some(Self::L4SrcPort),
            "L4_DST_PORT" => Some(Self::L4DstPort),
            _ => None,
        };
        alias
            .or_else(|| Self::ALL.into_iter().find(|k| k.to_string() == upper))
            .ok_or_else(|| format!("Unknown basic key: {}", s))
    }
}

/// Access command of the resource-management interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessCmd {
    Create,
    Destroy,
    Edit,
    Set,
    Add,
    Delete,
    DeleteAll,
    Bind,
    Unbind,
    Get,
    GetFirst,
    GetNext,
    Read,
    ReadClear,
}

impl fmt::Display for AccessCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Destroy => "DESTROY",
            Self::Edit => "EDIT",
            Self::Set => "SET",
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::DeleteAll => "DELETE_ALL",
            Self::Bind => "BIND",
            Self::Unbind => "UNBIND",
            Self::Get => "GET",
            Self::GetFirst => "GET_FIRST",
            Self::GetNext => "GETNEXT",
            Self::Read => "READ",
            Self::ReadClear => "READ_CLEAR",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AccessCmd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "DESTROY" => Ok(Self::Destroy),
            "EDIT" => Ok(Self::Edit),
            "SET" => Ok(Self::Set),
            "ADD" => Ok(Self::Add),
            "DELETE" => Ok(Self::Delete),
            "DELETE_ALL" => Ok(Self::DeleteAll),
            "BIND" => Ok(Self::Bind),
            "UNBIND" => Ok(Self::Unbind),
            "GET" => Ok(Self::Get),
            "GET_FIRST" => Ok(Self::GetFirst),
            "GETNEXT" | "GET_NEXT" => Ok(Self::GetNext),
            "READ" => Ok(Self::Read),
            "READ_CLEAR" => Ok(Self::ReadClear),
            _ => Err(format!("Unknown access command: {}", s)),
        }
    }
}

/// ACL type. Only the agnostic type is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AclType {
    #[default]
    Agnostic,
}

impl fmt::Display for AclType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agnostic => write!(f, "AGNOSTIC"),
        }
    }
}

/// Kind of object named in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    KeyType,
    Region,
    Acl,
    Group,
    Pbs,
    Range,
    CustomBytes,
    PortList,
    VlanGroup,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::KeyType => "KEY_TYPE",
            Self::Region => "REGION",
            Self::Acl => "ACL",
            Self::Group => "ACL_GROUP",
            Self::Pbs => "PBS",
            Self::Range => "RANGE",
            Self::CustomBytes => "CUSTOM_BYTES",
            Self::PortList => "PORT_LIST",
            Self::VlanGroup => "VLAN_GROUP",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_key_from_str() {
        assert_eq!("DIP".parse::<BasicKey>().unwrap(), BasicKey::DstIp);
        assert_eq!("dst_ip".parse::<BasicKey>().unwrap(), BasicKey::DstIp);
        assert_eq!(
            "L4_DST_PORT".parse::<BasicKey>().unwrap(),
            BasicKey::L4DstPort
        );
        assert!("NOT_A_KEY".parse::<BasicKey>().is_err());
    }

    #[test]
    fn test_basic_key_display_round_trips() {
        for key in BasicKey::ALL {
            assert_eq!(key.to_string().parse::<BasicKey>().unwrap(), key);
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let mut codes: Vec<_> = BasicKey::ALL.iter().map(|k| k.code()).collect();
        codes.dedup();
        assert_eq!(codes.len(), BasicKey::ALL.len());
    }

    #[test]
    fn test_access_cmd_spellings() {
        assert_eq!(AccessCmd::DeleteAll.to_string(), "DELETE_ALL");
        assert_eq!("GETNEXT".parse::<AccessCmd>().unwrap(), AccessCmd::GetNext);
        assert_eq!("get_next".parse::<AccessCmd>().unwrap(), AccessCmd::GetNext);
        assert!("PATCH".parse::<AccessCmd>().is_err());
    }
}
