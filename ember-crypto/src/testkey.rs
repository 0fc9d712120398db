//! A fixed 2048-bit keypair for unit tests. Never ship this key.

use crate::rsa::RsaPrivateKey;

const N: &str = "14160380012347668678986136435823657530531339716449593188497814257820360849126879554926250936297147254671757587641913942442767805825551340716275185707253235454085255059003657001037265341786067358908857377179460936531989867065540803132914077296810208975336997842910597747086994704850069700446358144305763498728853703913994301824807769390230925776985048522489957580951275124933191864236812620523387382167822850608689271286989513302864586513653900382541917420319554068649222942498333976141132084997311270767140509025097050916948739193354853050587147080996048942661117730719262866547733182571539636083399112808119879592701";
const E: &str = "65537";
const D: &str = "180415907202195757311952392143564002593857952961463147724120342787738244182995016988318347373363412387672880749515512488208357383834099356059779667448257497355099988926378283959688672969335890332009336862304497947788448342153692885179108817047416337250810888487882404120079353320258910231971390977544173847420451029756639420098198118426216067648715109482939012873762439093274502891525938867066577875556054799102774634434817915398213187626451823920664011601414865966135389767197487573225096186278163605170012532297243882161296091098070150421135195763642742252792464971050736141111853778706454991923673174485772556533";

pub(crate) fn private_key() -> RsaPrivateKey {
    RsaPrivateKey::new(N, E, D).unwrap()
}
