use serde::{Deserialize, Deserializer, Serialize};

/// One monitored area as reported by the alerts API.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct RegionAlerts {
    pub region_id: String,
    pub region_type: String,
    pub region_name: String,
    pub region_eng_name: String,
    pub last_update: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub active_alerts: Vec<ActiveAlert>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ActiveAlert>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ActiveAlert>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct ActiveAlert {
    pub region_id: String,
    pub region_type: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub last_update: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_api_payload() {
        let payload = r#"[
            {
                "regionId": "31",
                "regionType": "State",
                "regionName": "м. Київ",
                "regionEngName": "Kyiv City",
                "lastUpdate": "2024-01-01T10:05:00Z",
                "activeAlerts": [
                    {
                        "regionId": "31",
                        "regionType": "State",
                        "type": "AIR",
                        "lastUpdate": "2024-01-01T10:00:00Z"
                    }
                ]
            }
        ]"#;

        let records: Vec<RegionAlerts> = serde_json::from_str(payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region_eng_name, "Kyiv City");
        assert_eq!(records[0].active_alerts[0].alert_type, "AIR");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let records: Vec<RegionAlerts> =
            serde_json::from_str(r#"[{"regionId": "31", "extra": 1}]"#).unwrap();
        assert_eq!(records[0].region_id, "31");
        assert!(records[0].last_update.is_empty());
        assert!(records[0].active_alerts.is_empty());
    }

    #[test]
    fn null_alert_list_is_empty() {
        let records: Vec<RegionAlerts> =
            serde_json::from_str(r#"[{"regionId": "31", "activeAlerts": null}]"#).unwrap();
        assert!(records[0].active_alerts.is_empty());
    }
}
