use std::fmt;

use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::model::{Playlist, Track, UserId};
use crate::node::{LoadedTracks, Node};

/// Catálogo de búsqueda soportado por el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    YouTube,
    YouTubeMusic,
    SoundCloud,
    Twitch,
}

/// Metadata de presentación y de protocolo de cada catálogo
#[derive(Debug, Clone, Copy)]
pub struct SourceMetadata {
    /// Prefijo que el servidor interpreta como búsqueda; vacío significa que
    /// el catálogo solo acepta URLs directas
    pub search_prefix: &'static str,
    pub icon: &'static str,
    pub color: u32,
}

impl SourceKind {
    /// Tabla de metadata por catálogo
    pub fn metadata(self) -> SourceMetadata {
        match self {
            SourceKind::YouTube => SourceMetadata {
                search_prefix: "ytsearch",
                icon: "https://cdn.discordapp.com/emojis/908292349170446336.png",
                color: 0xff0101,
            },
            SourceKind::YouTubeMusic => SourceMetadata {
                search_prefix: "ytmsearch",
                icon: "https://cdn.discordapp.com/emojis/908292237786497034.png",
                color: 0xff0101,
            },
            SourceKind::SoundCloud => SourceMetadata {
                search_prefix: "scsearch",
                icon: "https://cdn.discordapp.com/emojis/954864037596917850.png",
                color: 0xf08f16,
            },
            SourceKind::Twitch => SourceMetadata {
                search_prefix: "",
                icon: "https://cdn.discordapp.com/emojis/908292214067691573.png",
                color: 0x9448ff,
            },
        }
    }

    /// Reconoce el catálogo a partir de una URL directa
    pub fn from_url(url: &str) -> Option<SourceKind> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        match host {
            "music.youtube.com" => Some(SourceKind::YouTubeMusic),
            "youtube.com" | "youtu.be" => Some(SourceKind::YouTube),
            "soundcloud.com" | "on.soundcloud.com" => Some(SourceKind::SoundCloud),
            "twitch.tv" => Some(SourceKind::Twitch),
            _ => None,
        }
    }

    /// URL de miniatura para pistas cuyo catálogo la expone
    pub fn thumbnail(self, identifier: &str) -> Option<String> {
        match self {
            SourceKind::YouTube => Some(format!(
                "https://img.youtube.com/vi/{identifier}/maxresdefault.jpg"
            )),
            SourceKind::YouTubeMusic => Some(format!(
                "https://i.ytimg.com/vi/{identifier}/maxresdefault.jpg"
            )),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::YouTube => "YouTube",
            SourceKind::YouTubeMusic => "YouTube Music",
            SourceKind::SoundCloud => "SoundCloud",
            SourceKind::Twitch => "Twitch",
        };
        f.write_str(name)
    }
}

/// Resultado de una búsqueda ya clasificado.
///
/// Una búsqueda sin coincidencias es una lista vacía, no un error.
#[derive(Debug, Clone)]
pub enum SearchResult {
    Track(Track),
    Tracks(Vec<Track>),
    Playlist(Playlist),
}

impl SearchResult {
    /// La primera pista del resultado, venga de donde venga
    pub fn first(&self) -> Option<&Track> {
        match self {
            SearchResult::Track(track) => Some(track),
            SearchResult::Tracks(tracks) => tracks.first(),
            SearchResult::Playlist(playlist) => playlist.tracks.first(),
        }
    }
}

/// Arma el identificador que entiende el servidor: las URLs pasan tal cual,
/// el texto libre lleva el prefijo de búsqueda del catálogo
fn build_query(kind: SourceKind, query: &str) -> String {
    if Url::parse(query).is_ok() {
        return query.to_string();
    }
    let prefix = kind.metadata().search_prefix;
    if prefix.is_empty() {
        query.to_string()
    } else {
        format!("{prefix}:{query}")
    }
}

/// Busca en un catálogo a través del REST del nodo
pub async fn search(
    node: &Node,
    kind: SourceKind,
    query: &str,
    requester: UserId,
) -> Result<SearchResult> {
    let identifier = build_query(kind, query);
    debug!("🔎 Búsqueda en {}: {}", kind, identifier);
    let result = match node.load_tracks(&identifier, requester).await? {
        LoadedTracks::TrackLoaded(track) => SearchResult::Track(track),
        LoadedTracks::SearchResult(tracks) => SearchResult::Tracks(tracks),
        LoadedTracks::Playlist(playlist) => SearchResult::Playlist(playlist),
        LoadedTracks::NoMatches => SearchResult::Tracks(Vec::new()),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn free_text_gets_the_catalog_prefix() {
        assert_eq!(
            build_query(SourceKind::YouTube, "never gonna give you up"),
            "ytsearch:never gonna give you up"
        );
        assert_eq!(
            build_query(SourceKind::SoundCloud, "lofi beats"),
            "scsearch:lofi beats"
        );
    }

    #[test]
    fn urls_pass_through_untouched() {
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        assert_eq!(build_query(SourceKind::YouTube, url), url);
    }

    #[test]
    fn twitch_has_no_search_prefix() {
        assert_eq!(build_query(SourceKind::Twitch, "algunstreamer"), "algunstreamer");
    }

    #[test]
    fn source_is_recognized_from_the_host() {
        assert_eq!(
            SourceKind::from_url("https://www.youtube.com/watch?v=abc"),
            Some(SourceKind::YouTube)
        );
        assert_eq!(
            SourceKind::from_url("https://music.youtube.com/watch?v=abc"),
            Some(SourceKind::YouTubeMusic)
        );
        assert_eq!(
            SourceKind::from_url("https://soundcloud.com/artista/pista"),
            Some(SourceKind::SoundCloud)
        );
        assert_eq!(
            SourceKind::from_url("https://www.twitch.tv/canal"),
            Some(SourceKind::Twitch)
        );
        assert_eq!(SourceKind::from_url("https://example.com/x"), None);
        assert_eq!(SourceKind::from_url("no es una url"), None);
    }
}
