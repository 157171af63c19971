//! Resource references
//!
//! A [`Reference`] identifies one API resource either by its opaque ID or by
//! an alternate lookup key (permalink, sub-domain, FQDN, ...). Each resource
//! family gets a typed wrapper that only exposes the identification modes the
//! API accepts for it.

use crate::api::error::ApiError;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::borrow::Cow;

/// Identifier for a single API resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    ById {
        scope: Option<Cow<'static, str>>,
        id: String,
    },
    ByLookupKey {
        scope: Option<Cow<'static, str>>,
        key: Cow<'static, str>,
        value: String,
    },
}

impl Reference {
    /// Unscoped reference by opaque ID
    pub fn by_id(id: impl Into<String>) -> Self {
        Reference::ById {
            scope: None,
            id: id.into(),
        }
    }

    /// Unscoped reference by an alternate lookup key
    pub fn by_lookup_key(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Reference::ByLookupKey {
            scope: None,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Nest the query key under a resource family, e.g. `network[permalink]`
    pub fn scoped(self, family: impl Into<Cow<'static, str>>) -> Self {
        let family = Some(family.into());
        match self {
            Reference::ById { id, .. } => Reference::ById { scope: family, id },
            Reference::ByLookupKey { key, value, .. } => Reference::ByLookupKey {
                scope: family,
                key,
                value,
            },
        }
    }

    /// Resource family this reference is scoped to, if any
    pub fn scope(&self) -> Option<&str> {
        match self {
            Reference::ById { scope, .. } | Reference::ByLookupKey { scope, .. } => {
                scope.as_deref()
            }
        }
    }

    /// Field name on the API side: `id` or the lookup key
    pub fn field(&self) -> &str {
        match self {
            Reference::ById { .. } => "id",
            Reference::ByLookupKey { key, .. } => key,
        }
    }

    /// The identifying value
    pub fn value(&self) -> &str {
        match self {
            Reference::ById { id, .. } => id,
            Reference::ByLookupKey { value, .. } => value,
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self, Reference::ById { .. })
    }

    /// The single `(key, value)` query pair for this reference.
    ///
    /// An empty identifier or lookup key is rejected as
    /// [`ErrorKind::InvalidArgument`](crate::api::error::ErrorKind::InvalidArgument).
    pub fn query_field(&self) -> Result<(String, String), ApiError> {
        let field = self.field();
        if field.is_empty() {
            return Err(ApiError::invalid_argument("reference has an empty lookup key"));
        }
        if self.value().is_empty() {
            return Err(ApiError::invalid_argument(format!(
                "{} reference has an empty {}",
                self.scope().unwrap_or("resource"),
                field
            )));
        }

        let key = match self.scope() {
            Some(scope) => format!("{}[{}]", scope, field),
            None => field.to_string(),
        };
        Ok((key, self.value().to_string()))
    }
}

impl AsRef<Reference> for Reference {
    fn as_ref(&self) -> &Reference {
        self
    }
}

/// Serializes as a one-entry object, `{"id": ...}` or `{"<key>": ...}`,
/// which is how request bodies refer to other resources.
impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field(), self.value())?;
        map.end()
    }
}

/// Declares a typed reference for one resource family.
///
/// `prefix = "netw_" => by_permalink` additionally generates `lookup()`, which
/// picks the ID variant when the input carries the family's ID prefix.
macro_rules! reference_family {
    (
        $(#[$meta:meta])*
        $name:ident, scope = $scope:literal
        $(, prefix = $prefix:literal => $fallback:ident)?
        $(, keys { $($ctor:ident => $key:literal),* $(,)? })? $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(Reference);

        impl $name {
            pub const SCOPE: &'static str = $scope;

            pub fn by_id(id: impl Into<String>) -> Self {
                Self(Reference::by_id(id).scoped($scope))
            }

            $($(
                pub fn $ctor(value: impl Into<String>) -> Self {
                    Self(Reference::by_lookup_key($key, value).scoped($scope))
                }
            )*)?

            $(
                pub const ID_PREFIX: &'static str = $prefix;

                /// Build from a string that is either an ID or a lookup value
                pub fn lookup(id_or_key: &str) -> Self {
                    if id_or_key.starts_with($prefix) {
                        Self::by_id(id_or_key)
                    } else {
                        Self::$fallback(id_or_key)
                    }
                }
            )?

            pub fn reference(&self) -> &Reference {
                &self.0
            }
        }

        impl AsRef<Reference> for $name {
            fn as_ref(&self) -> &Reference {
                &self.0
            }
        }

        impl From<$name> for Reference {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl $crate::resource::query::ToQuery for $name {
            fn encode_query(
                &self,
                query: &mut $crate::resource::query::QueryEncoder,
            ) -> Result<(), ApiError> {
                query.reference(&self.0)?;
                Ok(())
            }
        }
    };
}

reference_family!(
    /// An organization, by ID or sub-domain
    OrganizationRef, scope = "organization",
    prefix = "org_" => by_sub_domain,
    keys { by_sub_domain => "sub_domain" },
);

reference_family!(
    /// A network, by ID or permalink
    NetworkRef, scope = "network",
    prefix = "netw_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    DataCenterRef, scope = "data_center",
    prefix = "dc_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    ZoneRef, scope = "zone",
    prefix = "zone_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    /// A virtual machine, by ID or fully qualified domain name
    VirtualMachineRef, scope = "virtual_machine",
    prefix = "vm_" => by_fqdn,
    keys { by_fqdn => "fqdn" },
);

reference_family!(
    VirtualMachinePackageRef, scope = "virtual_machine_package",
    prefix = "vmpkg_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    DiskTemplateRef, scope = "disk_template",
    prefix = "dtpl_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    DnsZoneRef, scope = "dns_zone",
    prefix = "dnszone_" => by_name,
    keys { by_name => "name" },
);

reference_family!(
    IpAddressRef, scope = "ip_address",
    prefix = "ip_" => by_address,
    keys { by_address => "address" },
);

reference_family!(
    NetworkSpeedProfileRef, scope = "network_speed_profile",
    prefix = "nsp_" => by_permalink,
    keys { by_permalink => "permalink" },
);

reference_family!(
    /// A trash object, by its own ID or by the ID of the trashed object
    TrashObjectRef, scope = "trash_object",
    prefix = "trsh_" => by_object_id,
    keys { by_object_id => "object_id" },
);

reference_family!(LoadBalancerRef, scope = "load_balancer");
reference_family!(SecurityGroupRef, scope = "security_group");
reference_family!(TagRef, scope = "tag");
reference_family!(VirtualMachineGroupRef, scope = "virtual_machine_group");
reference_family!(VirtualMachineNetworkInterfaceRef, scope = "virtual_machine_network_interface");
reference_family!(CertificateRef, scope = "certificate");
