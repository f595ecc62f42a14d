use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraInfo {
    pub id: String,
    pub display_name: String,
}

/// Fixed, ordered camera catalogue for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraSet {
    cameras: Vec<CameraInfo>,
}

impl CameraSet {
    /// Builds a set from `(id, display name)` pairs. Duplicate ids keep the
    /// first entry; returns `None` when no camera remains.
    pub fn new<I, S>(entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut cameras: Vec<CameraInfo> = Vec::new();
        for (id, display_name) in entries {
            let id = id.into();
            if cameras.iter().any(|c| c.id == id) {
                continue;
            }
            cameras.push(CameraInfo {
                id,
                display_name: display_name.into(),
            });
        }
        if cameras.is_empty() {
            None
        } else {
            Some(Self { cameras })
        }
    }

    pub fn standard() -> Self {
        Self {
            cameras: [
                ("Front Gate Camera", "Front Gate"),
                ("Main Entrance", "Main Entrance"),
                ("Parking Area", "Parking Lot"),
                ("Lobby Camera", "Lobby Area"),
            ]
            .into_iter()
            .map(|(id, name)| CameraInfo {
                id: id.to_string(),
                display_name: name.to_string(),
            })
            .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraInfo> {
        self.cameras.iter()
    }

    pub fn first(&self) -> &CameraInfo {
        &self.cameras[0]
    }

    pub fn get(&self, id: &str) -> Option<&CameraInfo> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn nth(&self, index: usize) -> Option<&CameraInfo> {
        self.cameras.get(index)
    }

    /// Display name, or the raw id for cameras outside the set.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|c| c.display_name.as_str()).unwrap_or(id)
    }
}

/// Which camera the main viewer shows.
#[derive(Debug, Clone)]
pub struct CameraSession {
    active: String,
}

impl CameraSession {
    pub fn new(cameras: &CameraSet, preferred: Option<&str>) -> Self {
        let active = preferred
            .filter(|id| cameras.contains(id))
            .unwrap_or(cameras.first().id.as_str())
            .to_string();
        Self { active }
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    /// Returns `false` and leaves the session untouched for unknown ids.
    pub fn select(&mut self, cameras: &CameraSet, id: &str) -> bool {
        if !cameras.contains(id) {
            return false;
        }
        self.active = id.to_string();
        true
    }
}
