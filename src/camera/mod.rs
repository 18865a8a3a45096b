mod still;


pub use still::{CapturedPhoto, StillCamera, PHOTO_FILENAME, PHOTO_MIME_TYPE};
