//! Region and provider lookup tables

use std::fmt;

use tracing::warn;

/// Region used when none is configured or the configured one is unknown
pub const DEFAULT_REGION: &str = "us-east-1";

/// Regions the harness can provision into
pub const SUPPORTED_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "eu-west-1",
    "ap-southeast-1",
    "ap-northeast-1",
    "sa-east-1",
    "ap-southeast-2",
    "aws-eu-central-1",
    "gcp-us-central1",
    "gcp-europe-west-1",
    "azure-eastus2",
];

/// Domain and port of the externally reachable cluster endpoints
pub const ENDPOINT_DOMAIN: &str = "foundit.no";
pub const ENDPOINT_PORT: u16 = 9243;

/// Cloud provider hosting a region, derived once from the region name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gcp,
    Azure,
    /// Regions named `aws-*`
    Aws,
    /// Legacy staging regions without a provider prefix
    Other,
}

impl Provider {
    pub fn from_region(region: &str) -> Self {
        if region.contains("gcp") {
            Provider::Gcp
        } else if region.contains("azure") {
            Provider::Azure
        } else if region.starts_with("aws-") {
            Provider::Aws
        } else {
            Provider::Other
        }
    }

    /// Provider component of the endpoint host name
    pub fn url_token(&self) -> &'static str {
        match self {
            Provider::Gcp => "gcp",
            Provider::Azure => "staging.azure",
            Provider::Aws => "aws",
            Provider::Other => "aws.staging",
        }
    }

    fn region_prefix(&self) -> &'static str {
        match self {
            Provider::Gcp => "gcp-",
            Provider::Azure => "azure-",
            Provider::Aws => "aws-",
            Provider::Other => "",
        }
    }

    /// Instance configuration ids for every node role
    pub fn instance_configurations(&self) -> InstanceConfigurations {
        match self {
            Provider::Gcp => InstanceConfigurations {
                elasticsearch: "gcp.data.highio.1",
                kibana: "gcp.kibana.1",
                ml: "gcp.ml.1",
                ingest: "gcp.coordinating.1",
                apm: "gcp.apm.1",
                enterprise_search: "gcp.enterprisesearch.1d",
            },
            Provider::Azure => InstanceConfigurations {
                elasticsearch: "azure.data.highio.l32sv23",
                kibana: "azure.kibana.e32sv3",
                ml: "azure.ml.d64sv3",
                ingest: "azure.coordinating.d64sv3",
                apm: "azure.apm.e32sv3",
                enterprise_search: "azure.enterprisesearch.d64sv3",
            },
            Provider::Aws | Provider::Other => InstanceConfigurations {
                elasticsearch: "aws.data.highio.i3",
                kibana: "aws.kibana.r5d",
                ml: "aws.ml.m5",
                ingest: "aws.coordinating.m5",
                apm: "aws.apm.r5d",
                enterprise_search: "aws.enterprisesearch.m5d",
            },
        }
    }
}

/// Instance configuration ids of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceConfigurations {
    pub elasticsearch: &'static str,
    pub kibana: &'static str,
    pub ml: &'static str,
    pub ingest: &'static str,
    pub apm: &'static str,
    pub enterprise_search: &'static str,
}

/// A region name together with its provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    name: String,
    provider: Provider,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let provider = Provider::from_region(&name);
        Self { name, provider }
    }

    /// Pick the configured region if it is supported, else the default
    pub fn select(requested: Option<&str>) -> Self {
        match requested {
            Some(name) if SUPPORTED_REGIONS.contains(&name) => Region::new(name),
            Some(name) => {
                warn!("Unsupported region {}, using {}", name, DEFAULT_REGION);
                Region::new(DEFAULT_REGION)
            }
            None => Region::new(DEFAULT_REGION),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Region component of the endpoint host name, without provider prefix
    pub fn url_region(&self) -> &str {
        self.name
            .strip_prefix(self.provider.region_prefix())
            .unwrap_or(&self.name)
    }

    /// Externally reachable URL of a resource in this region
    pub fn endpoint_url(&self, resource_id: &str) -> String {
        format!(
            "https://{}.{}.{}.{}:{}",
            resource_id,
            self.url_region(),
            self.provider.url_token(),
            ENDPOINT_DOMAIN,
            ENDPOINT_PORT
        )
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
