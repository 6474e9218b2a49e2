//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod members {
    pub const MEMBERS: &str = "/members";
    pub const MEMBER: &str = "/members/:member_id";
    pub const SUSPECTED: &str = "/members/suspected";
}

pub fn member_path(member_id: &str) -> String {
    members::MEMBER.replace(":member_id", member_id)
}
