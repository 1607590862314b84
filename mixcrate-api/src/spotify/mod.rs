//! Spotify integration
//!
//! A thin Web API client behind a capability trait (so tests inject a
//! fixture), the OAuth PKCE helpers, and the sync ingestor that reconciles
//! provider playlists into the catalog.

mod client;
mod sync;

pub use client::{
    is_auth_expired, CatalogProvider, RemotePlaylist, RemoteTrackItem, SpotifyClient,
    TokenResponse, AUTH_URL,
};
pub use sync::{discover_playlists, sync_account, PlaylistSyncSummary, SyncSummary};
