use std::fmt;
use std::str::FromStr;

/// A `(zoom, x, y)` addressed partition of the provider's coverage area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Expands `{z}`, `{x}` and `{y}` placeholders in a provider URL template.
    pub fn render_url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileParseError {
    Shape { input: String },
    Component { input: String, component: &'static str },
}

impl fmt::Display for TileParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileParseError::Shape { input } => {
                write!(f, "tile '{input}' must have the form zoom/x/y")
            }
            TileParseError::Component { input, component } => {
                write!(f, "tile '{input}' has an invalid {component} component")
            }
        }
    }
}

impl std::error::Error for TileParseError {}

impl FromStr for TileCoord {
    type Err = TileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let parts: Vec<&str> = input.split('/').map(str::trim).collect();
        let [zoom, x, y] = parts.as_slice() else {
            return Err(TileParseError::Shape {
                input: input.to_owned(),
            });
        };

        let component = |value: &str, name: &'static str| {
            value.parse::<u32>().map_err(|_| TileParseError::Component {
                input: input.to_owned(),
                component: name,
            })
        };

        let zoom = component(*zoom, "zoom")?;
        let zoom = u8::try_from(zoom).map_err(|_| TileParseError::Component {
            input: input.to_owned(),
            component: "zoom",
        })?;

        Ok(Self {
            zoom,
            x: component(*x, "x")?,
            y: component(*y, "y")?,
        })
    }
}

/// Parses a semicolon-delimited `z/x/y;z/x/y` list, skipping empty segments.
pub fn parse_tile_list(input: &str) -> Result<Vec<TileCoord>, TileParseError> {
    input
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(TileCoord::from_str)
        .collect()
}
