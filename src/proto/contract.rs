//! Contract values and events.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ContractEventType {
    System = 0,
    Contract = 1,
    Diagnostic = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContractEvent {
    #[prost(bytes = "vec", tag = "1")]
    pub contract_id: Vec<u8>,
    #[prost(enumeration = "ContractEventType", tag = "2")]
    pub event_type: i32,
    #[prost(message, repeated, tag = "3")]
    pub topics: Vec<ScVal>,
    #[prost(message, optional, tag = "4")]
    pub data: Option<ScVal>,
}

/// 128-bit signed integer split into halves.
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Int128Parts {
    #[prost(int64, tag = "1")]
    pub hi: i64,
    #[prost(uint64, tag = "2")]
    pub lo: u64,
}

impl Int128Parts {
    pub fn from_i128(value: i128) -> Self {
        Self {
            hi: (value >> 64) as i64,
            lo: value as u64,
        }
    }

    pub fn to_i128(self) -> i128 {
        ((self.hi as i128) << 64) | self.lo as i128
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScMapEntry {
    #[prost(message, optional, tag = "1")]
    pub key: Option<ScVal>,
    #[prost(message, optional, tag = "2")]
    pub val: Option<ScVal>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScMap {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<ScMapEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScVal {
    #[prost(oneof = "sc_val::Value", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9")]
    pub value: Option<sc_val::Value>,
}

pub mod sc_val {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(bool, tag = "1")]
        Bool(bool),
        #[prost(uint32, tag = "2")]
        U32(u32),
        #[prost(int64, tag = "3")]
        I64(i64),
        #[prost(message, tag = "4")]
        I128(super::Int128Parts),
        #[prost(string, tag = "5")]
        Symbol(String),
        #[prost(string, tag = "6")]
        Str(String),
        #[prost(bytes = "vec", tag = "7")]
        Bytes(Vec<u8>),
        #[prost(string, tag = "8")]
        Address(String),
        #[prost(message, tag = "9")]
        Map(super::ScMap),
    }
}

impl ScVal {
    pub fn symbol(s: impl Into<String>) -> Self {
        Self {
            value: Some(sc_val::Value::Symbol(s.into())),
        }
    }

    pub fn address(s: impl Into<String>) -> Self {
        Self {
            value: Some(sc_val::Value::Address(s.into())),
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: Some(sc_val::Value::Str(s.into())),
        }
    }

    pub fn i128(v: i128) -> Self {
        Self {
            value: Some(sc_val::Value::I128(Int128Parts::from_i128(v))),
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.value {
            Some(sc_val::Value::Symbol(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&str> {
        match &self.value {
            Some(sc_val::Value::Address(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Some(sc_val::Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i128(&self) -> Option<i128> {
        match &self.value {
            Some(sc_val::Value::I128(parts)) => Some(parts.to_i128()),
            _ => None,
        }
    }

    /// Look up a symbol-keyed entry of a map value.
    pub fn map_get(&self, key: &str) -> Option<&ScVal> {
        match &self.value {
            Some(sc_val::Value::Map(map)) => map
                .entries
                .iter()
                .find(|e| e.key.as_ref().and_then(ScVal::as_symbol) == Some(key))
                .and_then(|e| e.val.as_ref()),
            _ => None,
        }
    }
}
