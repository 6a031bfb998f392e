pub mod ffmpeg_media_devices;
