pub mod http_speaker_classifier;
