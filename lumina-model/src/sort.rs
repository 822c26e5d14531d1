use serde::{Deserialize, Serialize};

/// Sort keys the index engine maintains a sorted set for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    UpdatedAt,
    CreatedAt,
    Name,
    ImageCount,
    TotalSize,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::UpdatedAt,
        SortField::CreatedAt,
        SortField::Name,
        SortField::ImageCount,
        SortField::TotalSize,
    ];

    /// Key segment used in the KVS keyspace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdatedAt => "updatedAt",
            Self::CreatedAt => "createdAt",
            Self::Name => "name",
            Self::ImageCount => "imageCount",
            Self::TotalSize => "totalSize",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "updatedAt" => Some(Self::UpdatedAt),
            "createdAt" => Some(Self::CreatedAt),
            "name" => Some(Self::Name),
            "imageCount" => Some(Self::ImageCount),
            "totalSize" => Some(Self::TotalSize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const ALL: [SortDirection; 2] = [SortDirection::Asc, SortDirection::Desc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// Sign applied to raw score values so that ascending set order matches
    /// the logical order.
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Asc => 1.0,
            Self::Desc => -1.0,
        }
    }
}
