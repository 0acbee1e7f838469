//! Name to id lookup for the properties of a plane.

use std::collections::HashMap;

use drm::control::{plane, property, Device as ControlDevice};
use tracing::{trace, warn};

use super::error::{AccessError, Error};
use crate::utils::DevPath;

/// Snapshot of the settable properties of a plane
///
/// Property ids are assigned by the kernel and do not change for the lifetime of the
/// device, so the table is filled once and only read afterwards.
#[derive(Debug, Clone)]
pub struct PropertyCache {
    plane: plane::Handle,
    ids: HashMap<String, property::Handle>,
}

impl PropertyCache {
    /// Query all properties of `plane` from the device
    pub fn snapshot<D>(fd: &D, plane: plane::Handle) -> Result<PropertyCache, Error>
    where
        D: DevPath + ControlDevice,
    {
        let props = fd.get_properties(plane).map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error reading plane properties",
                dev: fd.dev_path(),
                source,
            })
        })?;

        let (prop_handles, _) = props.as_props_and_values();
        let cache = PropertyCache::resolve(plane, prop_handles.iter().copied(), |prop| {
            fd.get_property(prop).map(|info| info.name().to_string_lossy().into_owned())
        });
        trace!(?plane, "Plane properties: {:?}", cache.ids);

        Ok(cache)
    }

    /// Name every handle of `props` with `name_of`
    ///
    /// A property whose info can not be loaded is logged and left out, a later lookup
    /// reports it as unknown.
    fn resolve<F>(
        plane: plane::Handle,
        props: impl ExactSizeIterator<Item = property::Handle>,
        mut name_of: F,
    ) -> PropertyCache
    where
        F: FnMut(property::Handle) -> std::io::Result<String>,
    {
        let mut ids = HashMap::with_capacity(props.len());
        for prop in props {
            match name_of(prop) {
                Ok(name) => {
                    ids.insert(name, prop);
                }
                Err(err) => warn!(?plane, ?prop, "Failed to load property info: {}", err),
            }
        }
        PropertyCache { plane, ids }
    }

    /// Build a cache out of already known ids
    pub fn from_ids(
        plane: plane::Handle,
        ids: impl IntoIterator<Item = (String, property::Handle)>,
    ) -> PropertyCache {
        PropertyCache {
            plane,
            ids: ids.into_iter().collect(),
        }
    }

    /// The plane this cache belongs to
    pub fn plane(&self) -> plane::Handle {
        self.plane
    }

    /// Look up the id of the property `name`
    pub fn get(&self, name: &'static str) -> Result<property::Handle, Error> {
        self.ids.get(name).copied().ok_or_else(|| Error::UnknownProperty {
            handle: self.plane.into(),
            name,
        })
    }

    /// Amount of known properties
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the plane reported no properties
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
