// Systemd D-Bus client using zbus

use crate::error::{CheckError, Result};
use crate::systemd::source::{
    BootListing, BusBootTimestamps, BusTimerRow, BusUnitRow, TimerListing, UnitListing, UnitSource,
};
use crate::systemd::{ConnectionManager, UnitScope};
use std::collections::HashMap;
use std::future::Future;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::Connection;

const DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Tuple returned by `ListUnits`: (name, description, load_state,
/// active_state, sub_state, followed, unit_path, job_id, job_type, job_path)
type ListUnitsEntry = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

/// Backend that queries systemd's D-Bus API
pub struct DbusSource {
    connection: Connection,
    user_connection: Option<Connection>,
}

impl DbusSource {
    /// Connect to the system bus, and to the session bus when user units
    /// are requested
    pub async fn connect(manager: &ConnectionManager, with_user_units: bool) -> Result<Self> {
        let connection = manager.connect_system().await?;
        let user_connection = if with_user_units {
            Some(manager.connect_session().await?)
        } else {
            None
        };

        Ok(Self {
            connection,
            user_connection,
        })
    }

    fn connection_for(&self, scope: UnitScope) -> Result<&Connection> {
        match scope {
            UnitScope::System => Ok(&self.connection),
            UnitScope::User => self
                .user_connection
                .as_ref()
                .ok_or_else(|| CheckError::BusConnection("User bus not available".to_string()).into()),
        }
    }

    async fn manager_proxy<'a>(connection: &'a Connection) -> Result<zbus::Proxy<'a>> {
        let proxy = zbus::Proxy::new(connection, DESTINATION, MANAGER_PATH, MANAGER_INTERFACE)
            .await
            .map_err(|e| CheckError::BusConnection(e.to_string()))?;
        Ok(proxy)
    }

    async fn list_units(connection: &Connection) -> Result<Vec<ListUnitsEntry>> {
        let proxy = Self::manager_proxy(connection).await?;
        let units: Vec<ListUnitsEntry> = proxy
            .call("ListUnits", &())
            .await
            .map_err(|e| CheckError::Acquisition(format!("ListUnits: {}", e)))?;
        tracing::debug!("ListUnits returned {} units", units.len());
        Ok(units)
    }

    /// Get all properties of an object from D-Bus
    async fn get_properties(
        connection: &Connection,
        path: &str,
    ) -> Result<HashMap<String, OwnedValue>> {
        let props_proxy = zbus::fdo::PropertiesProxy::builder(connection)
            .destination(DESTINATION)?
            .path(path)?
            .build()
            .await
            .map_err(|e| CheckError::BusConnection(e.to_string()))?;

        use zbus::zvariant::Optional;
        let props = props_proxy
            .get_all(Optional::default())
            .await
            .map_err(|e| CheckError::Acquisition(format!("Failed to get properties of {}: {}", path, e)))?;

        Ok(props)
    }

    async fn unit_path(connection: &Connection, name: &str) -> Result<OwnedObjectPath> {
        let proxy = Self::manager_proxy(connection).await?;
        // LoadUnit works for units that are not loaded, unlike GetUnit
        let path: OwnedObjectPath = proxy
            .call("LoadUnit", &(name,))
            .await
            .map_err(|e| CheckError::Acquisition(format!("LoadUnit {}: {}", name, e)))?;
        Ok(path)
    }

    async fn default_target_reached(connection: &Connection) -> Result<u64> {
        let proxy = Self::manager_proxy(connection).await?;
        let target: String = match proxy.call("GetDefaultTarget", &()).await {
            Ok(target) => target,
            Err(e) => {
                tracing::debug!("GetDefaultTarget failed: {}", e);
                return Ok(0);
            }
        };
        let path = Self::unit_path(connection, &target).await?;
        let props = Self::get_properties(connection, path.as_str()).await?;
        Ok(get_u64(&props, "ActiveEnterTimestampMonotonic"))
    }
}

fn get_u64(props: &HashMap<String, OwnedValue>, key: &str) -> u64 {
    props
        .get(key)
        .and_then(|v| v.downcast_ref::<u64>().ok())
        .unwrap_or(0)
}

fn get_string(props: &HashMap<String, OwnedValue>, key: &str) -> String {
    props
        .get(key)
        .and_then(|v| v.downcast_ref::<String>().ok())
        .unwrap_or_default()
}

impl UnitSource for DbusSource {
    fn fetch_units(&self, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send {
        async move {
            let connection = self.connection_for(scope)?;
            let rows = Self::list_units(connection)
                .await?
                .into_iter()
                .map(|(name, description, load_state, active_state, sub_state, ..)| BusUnitRow {
                    name,
                    description,
                    load_state,
                    active_state,
                    sub_state,
                })
                .collect();
            Ok(UnitListing::Bus(rows))
        }
    }

    fn fetch_unit(&self, name: &str, scope: UnitScope) -> impl Future<Output = Result<UnitListing>> + Send {
        async move {
            let connection = self.connection_for(scope)?;
            let path = Self::unit_path(connection, name).await?;
            let props = Self::get_properties(connection, path.as_str()).await?;
            let id = get_string(&props, "Id");
            Ok(UnitListing::Bus(vec![BusUnitRow {
                name: if id.is_empty() { name.to_string() } else { id },
                description: get_string(&props, "Description"),
                load_state: get_string(&props, "LoadState"),
                active_state: get_string(&props, "ActiveState"),
                sub_state: get_string(&props, "SubState"),
            }]))
        }
    }

    fn fetch_timers(&self) -> impl Future<Output = Result<TimerListing>> + Send {
        async move {
            let mut timers = Vec::new();
            for (name, .., unit_path, _, _, _) in Self::list_units(&self.connection).await? {
                if !name.ends_with(".timer") {
                    continue;
                }
                let props = Self::get_properties(&self.connection, unit_path.as_str()).await?;
                timers.push(BusTimerRow {
                    next_elapse_usec: get_u64(&props, "NextElapseUSecRealtime"),
                    next_elapse_monotonic_usec: get_u64(&props, "NextElapseUSecMonotonic"),
                    last_trigger_usec: get_u64(&props, "LastTriggerUSec"),
                    unit: get_string(&props, "Unit"),
                    name,
                });
            }
            Ok(TimerListing::Bus(timers))
        }
    }

    fn fetch_startup(&self) -> impl Future<Output = Result<BootListing>> + Send {
        async move {
            let props = Self::get_properties(&self.connection, MANAGER_PATH).await?;
            let finish = get_u64(&props, "FinishTimestampMonotonic");
            if finish == 0 {
                return Ok(BootListing::NotFinished);
            }
            Ok(BootListing::Bus(BusBootTimestamps {
                firmware: get_u64(&props, "FirmwareTimestampMonotonic"),
                loader: get_u64(&props, "LoaderTimestampMonotonic"),
                initrd: get_u64(&props, "InitRDTimestampMonotonic"),
                userspace: get_u64(&props, "UserspaceTimestampMonotonic"),
                finish,
                default_target: Self::default_target_reached(&self.connection).await?,
            }))
        }
    }
}
